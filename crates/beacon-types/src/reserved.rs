//! Reserved action property names.
//!
//! The analytics API gives these keys special meaning when they appear in an
//! action's properties map.

pub const SALE_VALUE: &str = "$sale_value";
pub const SALE_CURRENCY: &str = "$sale_currency";

pub const DEVICE_AGENT: &str = "$device_agent";
pub const DEVICE_OS: &str = "$device_os";
pub const DEVICE_RESOLUTION: &str = "$device_resolution";
pub const DEVICE_MOBILE: &str = "$device_mobile";

pub const COUNTRY: &str = "$country";
pub const REGION: &str = "$region";
pub const CITY: &str = "$city";

pub const GENDER: &str = "$gender";
pub const AGE: &str = "$age";

pub const UTM_CAMPAIGN: &str = "$utm_campaign";
pub const UTM_SOURCE: &str = "$utm_source";
pub const UTM_MEDIUM: &str = "$utm_medium";
pub const UTM_CONTENT: &str = "$utm_content";
pub const UTM_TERM: &str = "$utm_term";

/// Returns true if `name` is one of the reserved property names.
pub fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        SALE_VALUE
            | SALE_CURRENCY
            | DEVICE_AGENT
            | DEVICE_OS
            | DEVICE_RESOLUTION
            | DEVICE_MOBILE
            | COUNTRY
            | REGION
            | CITY
            | GENDER
            | AGE
            | UTM_CAMPAIGN
            | UTM_SOURCE
            | UTM_MEDIUM
            | UTM_CONTENT
            | UTM_TERM
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_are_recognized() {
        assert!(is_reserved(SALE_VALUE));
        assert!(is_reserved(UTM_TERM));
        assert!(is_reserved("$device_os"));
    }

    #[test]
    fn custom_names_are_not_reserved() {
        assert!(!is_reserved("plan"));
        assert!(!is_reserved("sale_value"));
        assert!(!is_reserved(""));
    }
}
