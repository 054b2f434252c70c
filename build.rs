use rustc_version::version;

fn main() {
    // Surfaced in the CLI's long version string.
    let rustc = match version() {
        Ok(v) => v.to_string(),
        Err(_) => "unknown".to_owned(),
    };
    println!("cargo:rustc-env=RUSTC_VERSION={rustc}");
    println!("cargo:rerun-if-changed=build.rs");
}
