//! Simple zero-overhead unit of measure types
//!
//! Keeps the physical quantities decoded from FIT records correct by
//! construction.  FIT stores everything in scaled SI integers; the decoded
//! points are reported in US customary units, so the conversions between the
//! two live here.

use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign, Div};

use approx::{AbsDiffEq, RelativeEq, relative_eq};
use num_traits::{Float, Num};

/// Semicircles in a half turn: 2^31.
const SEMICIRCLES_PER_180_DEG: f64 = 2_147_483_648.0;

pub const FEET_PER_METER: f64 = 3.280839895;
pub const FEET_PER_MILE: f64 = 5280.0;
pub const MPH_PER_METER_PER_SECOND: f64 = 2.23694;

macro_rules! unit_of_measure {
    ($u:ident, $suffix:literal) => {
        #[derive(Clone, Copy, Default, PartialEq, PartialOrd, Debug)]
        pub struct $u<N: Num>(pub N);

        impl<N> Add for $u<N>
        where
            N: Num + Add,
        {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl<N> AddAssign for $u<N>
        where
            N: Num + AddAssign,
        {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl<N> Div<N> for $u<N>
        where
            N: Num + Div,
        {
            type Output = Self;

            fn div(self, rhs: N) -> Self {
                Self(self.0 / rhs)
            }
        }

        impl<N> Display for $u<N>
        where
            N: Num + Display,
        {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)?;
                f.write_str($suffix)
            }
        }

        // Relative equality traits for approx support

        impl<N> AbsDiffEq for $u<N>
        where
            N: Num + Float + AbsDiffEq<N, Epsilon = N>,
        {
            type Epsilon = N;

            fn default_epsilon() -> Self::Epsilon {
                N::epsilon()
            }

            fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
                self.0.abs_diff_eq(&other.0, epsilon)
            }
        }

        impl<N> RelativeEq for $u<N>
        where
            N: Num + Float + AbsDiffEq<N, Epsilon = N> + RelativeEq<N>,
        {
            fn default_max_relative() -> Self::Epsilon {
                N::epsilon()
            }

            fn relative_eq(
                &self,
                other: &Self,
                epsilon: Self::Epsilon,
                max_relative: Self::Epsilon,
            ) -> bool {
                relative_eq!(
                    self.0,
                    other.0,
                    epsilon = epsilon,
                    max_relative = max_relative
                )
            }
        }
    };
}

// Angular units:
unit_of_measure!(Semicircles, " semicircles");
unit_of_measure!(Degrees, "°");

// Distance units:
unit_of_measure!(Meters, "m");
unit_of_measure!(Feet, "ft");
unit_of_measure!(Miles, "mi");

// Velocity / speed units:
unit_of_measure!(MetersPerSecond, "m/s");
unit_of_measure!(MilesPerHour, "mph");

// Temperature units:
unit_of_measure!(Celsius, "°C");
unit_of_measure!(Fahrenheit, "°F");

impl From<Semicircles<i32>> for Degrees<f64> {
    fn from(value: Semicircles<i32>) -> Self {
        Degrees(value.0 as f64 * 180.0 / SEMICIRCLES_PER_180_DEG)
    }
}

impl From<Meters<f64>> for Feet<f64> {
    fn from(value: Meters<f64>) -> Self {
        Feet(value.0 * FEET_PER_METER)
    }
}

impl From<Feet<f64>> for Miles<f64> {
    fn from(value: Feet<f64>) -> Self {
        Miles(value.0 / FEET_PER_MILE)
    }
}

impl From<Meters<f64>> for Miles<f64> {
    fn from(value: Meters<f64>) -> Self {
        Feet::from(value).into()
    }
}

impl From<MetersPerSecond<f64>> for MilesPerHour<f64> {
    fn from(value: MetersPerSecond<f64>) -> Self {
        MilesPerHour(value.0 * MPH_PER_METER_PER_SECOND)
    }
}

impl From<Celsius<f64>> for Fahrenheit<f64> {
    fn from(value: Celsius<f64>) -> Self {
        Fahrenheit(value.0 * 1.8 + 32.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn unit_addition() {
        let a = Meters(2);
        let b = Meters(3);
        assert_eq!(a + b, Meters(5));
    }

    #[test]
    fn semicircles_to_degrees() {
        assert_eq!(Degrees::from(Semicircles(0)), Degrees(0.0));
        assert_eq!(Degrees::from(Semicircles(i32::MIN)), Degrees(-180.0));
        assert_eq!(Degrees::from(Semicircles(1 << 30)), Degrees(90.0));
        assert_relative_eq!(
            Degrees::from(Semicircles(1402806806)),
            Degrees(1402806806.0 * 180.0 / 2147483648.0)
        );
    }

    #[test]
    fn meters_to_feet_and_miles() {
        assert_relative_eq!(
            Feet::from(Meters(180.0)),
            Feet(590.5511811),
            max_relative = 1e-12
        );
        assert_relative_eq!(Miles::from(Meters(1609.344)), Miles(1.0), max_relative = 1e-9);
        assert_eq!(Miles::from(Feet(10560.0)), Miles(2.0));
    }

    #[test]
    fn speed_and_temperature() {
        assert_relative_eq!(
            MilesPerHour::from(MetersPerSecond(10.0)),
            MilesPerHour(22.3694),
            max_relative = 1e-12
        );
        assert_eq!(Fahrenheit::from(Celsius(20.0)), Fahrenheit(68.0));
        assert_eq!(Fahrenheit::from(Celsius(-40.0)), Fahrenheit(-40.0));
    }

    #[test]
    fn display_suffix() {
        assert_eq!(Feet(12.5).to_string(), "12.5ft");
        assert_eq!(Degrees(1.5).to_string(), "1.5°");
    }
}
