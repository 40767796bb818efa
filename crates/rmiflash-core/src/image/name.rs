//! Image names
//!
//! Images without an embedded build id carry their firmware version in the
//! file name, as the decimal number following the first `PR`
//! (`PR1116007_00000002.img` is version 1116007).

use alloc::string::String;

use crate::error::{Error, Result};

/// Image name used when none has been configured
pub const DEFAULT_IMAGE_NAME: &str = "PR1116007_00000002.img";

/// Extract the firmware version from an image name
///
/// Fails with [`Error::NoVersionToken`] if the name has no `PR`, no digits
/// directly after it, or a number that does not fit in 32 bits.
pub fn version_from_name(name: &str) -> Result<u32> {
    let start = name.find("PR").ok_or(Error::NoVersionToken)? + 2;
    let digits = name[start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return Err(Error::NoVersionToken);
    }
    name[start..start + digits]
        .parse()
        .map_err(|_| Error::NoVersionToken)
}

/// Sensor vendor variant selected by the sensor id pins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorVendor {
    /// Both pins low
    Vendor1,
    /// Second pin high
    Vendor2,
    /// First pin high
    Vendor3,
}

impl SensorVendor {
    /// Map the two sensor id pin levels to a vendor
    ///
    /// Returns `None` when both pins read high, which no vendor uses.
    pub fn from_pins(first: bool, second: bool) -> Option<Self> {
        match (first, second) {
            (false, false) => Some(Self::Vendor1),
            (false, true) => Some(Self::Vendor2),
            (true, false) => Some(Self::Vendor3),
            (true, true) => None,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Vendor1 => "vendor1",
            Self::Vendor2 => "vendor2",
            Self::Vendor3 => "vendor3",
        }
    }
}

/// Build the per-vendor variant of an image name
///
/// `PR1116007_00000002.img` becomes `PR1116007_00000002.vendor2.img`.
/// Without a vendor only the extension is normalized.
pub fn vendor_image_name(name: &str, vendor: Option<SensorVendor>) -> String {
    let base = name.split('.').next().unwrap_or(name);
    let mut out = String::with_capacity(base.len() + 12);
    out.push_str(base);
    if let Some(vendor) = vendor {
        out.push('.');
        out.push_str(vendor.suffix());
    }
    out.push_str(".img");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_name() {
        assert_eq!(version_from_name(DEFAULT_IMAGE_NAME), Ok(1116007));
        assert_eq!(version_from_name("fw_PR150_x.img"), Ok(150));
        assert_eq!(version_from_name("PR0.img"), Ok(0));
    }

    #[test]
    fn test_version_missing() {
        assert_eq!(version_from_name("firmware.img"), Err(Error::NoVersionToken));
        assert_eq!(version_from_name("PRX150.img"), Err(Error::NoVersionToken));
        assert_eq!(version_from_name("fw_PR"), Err(Error::NoVersionToken));
        assert_eq!(
            version_from_name("PR99999999999.img"),
            Err(Error::NoVersionToken)
        );
    }

    #[test]
    fn test_only_first_pr_counts() {
        assert_eq!(version_from_name("PRE_PR200.img"), Err(Error::NoVersionToken));
    }

    #[test]
    fn test_vendor_image_name() {
        assert_eq!(
            vendor_image_name(DEFAULT_IMAGE_NAME, Some(SensorVendor::Vendor2)),
            "PR1116007_00000002.vendor2.img"
        );
        assert_eq!(
            vendor_image_name("plain", Some(SensorVendor::Vendor1)),
            "plain.vendor1.img"
        );
        assert_eq!(vendor_image_name("a.b.img", None), "a.img");
        assert_eq!(SensorVendor::from_pins(true, false), Some(SensorVendor::Vendor3));
        assert_eq!(SensorVendor::from_pins(true, true), None);
    }
}
