use std::convert::TryFrom;

use anyhow::{anyhow, Result};

pub fn to_u16(value: i64, field: &str) -> Result<u16> {
    u16::try_from(value).map_err(|_| anyhow!("{field} contains out-of-range value {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_values_outside_u16() {
        assert_eq!(to_u16(204, "status").unwrap(), 204);
        assert!(to_u16(70_000, "status").is_err());
        assert!(to_u16(-1, "status").is_err());
    }
}
