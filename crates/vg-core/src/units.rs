// vg-core/src/units.rs

use uom::si::f64::{Pressure as UomPressure, Time as UomTime};

pub type Pressure = UomPressure;
pub type Time = UomTime;

#[inline]
pub fn pa(v: f64) -> Pressure {
    use uom::si::pressure::pascal;
    Pressure::new::<pascal>(v)
}

#[inline]
pub fn kpa(v: f64) -> Pressure {
    use uom::si::pressure::kilopascal;
    Pressure::new::<kilopascal>(v)
}

/// Pressure value in pascal.
#[inline]
pub fn to_pa(p: Pressure) -> f64 {
    use uom::si::pressure::pascal;
    p.get::<pascal>()
}

#[inline]
pub fn s(v: f64) -> Time {
    use uom::si::time::second;
    Time::new::<second>(v)
}

#[inline]
pub fn ms(v: f64) -> Time {
    use uom::si::time::millisecond;
    Time::new::<millisecond>(v)
}

/// Convert a non-negative uom time into a `std::time::Duration` for timers.
pub fn to_duration(t: Time) -> std::time::Duration {
    use uom::si::time::second;
    std::time::Duration::from_secs_f64(t.get::<second>().max(0.0))
}
