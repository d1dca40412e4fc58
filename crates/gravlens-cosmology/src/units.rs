//! Physical constants and unit conversions (SI).

/// Newton's gravitational constant (m³ kg⁻¹ s⁻²).
pub const GRAVITATIONAL_CONSTANT: f64 = 6.674_30e-11;

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Solar mass (kg).
pub const SOLAR_MASS: f64 = 1.988_47e30;

/// One megaparsec (m).
pub const MEGAPARSEC: f64 = 3.085_677_581_491_367_3e22;

/// One arcsecond (rad).
pub const ARCSEC: f64 = std::f64::consts::PI / (180.0 * 3600.0);

/// Convert arcseconds to radians.
#[inline]
pub fn arcsec_to_rad(arcsec: f64) -> f64 {
    arcsec * ARCSEC
}

/// Convert radians to arcseconds.
#[inline]
pub fn rad_to_arcsec(rad: f64) -> f64 {
    rad / ARCSEC
}

/// Convert km/s to m/s.
#[inline]
pub fn kms_to_ms(kms: f64) -> f64 {
    kms * 1000.0
}

/// Convert a distance in Mpc to metres.
#[inline]
pub fn mpc_to_m(mpc: f64) -> f64 {
    mpc * MEGAPARSEC
}
