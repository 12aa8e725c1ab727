/*!
Account address parsing with EIP-55 checksum enforcement
*/

use std::str::FromStr;

pub use alloy::primitives::Address;
use serde::{Deserialize, Deserializer, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must be 40 hex characters, got {0}")]
    Length(usize),
    #[error("address contains non-hex characters")]
    NotHex,
    #[error("address checksum mismatch")]
    Checksum,
}

/// Accepts an optional `0x` prefix. Mixed case input must carry a valid
/// checksum; all-lowercase and all-uppercase input is taken as is.
pub fn parse_address(value: &str) -> Result<Address, AddressError> {
    let body = value.strip_prefix("0x").unwrap_or(value);
    if body.len() != 40 {
        return Err(AddressError::Length(body.len()));
    }
    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AddressError::NotHex);
    }

    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(format!("0x{body}"), None)
            .map_err(|_| AddressError::Checksum);
    }
    Address::from_str(body).map_err(|_| AddressError::NotHex)
}

/// Same acceptance rule the login endpoint applies to `walletAddress`
pub fn is_valid_address(value: &str) -> bool {
    parse_address(value).is_ok()
}

/// Serde helpers writing the checksummed form and validating on read
pub mod checksummed {
    use super::*;

    pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(address)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_address(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            address: &Option<Address>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match address {
                Some(address) => serializer.collect_str(address),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Address>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| parse_address(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    const CHECKSUMMED: [&str; 4] = [
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
        "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
        "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
    ];

    #[test]
    fn checksum_round_trips_known_vectors() {
        for expected in CHECKSUMMED {
            let address = parse_address(&expected.to_lowercase()).unwrap();
            assert_eq!(address.to_string(), expected);
            assert_eq!(parse_address(expected).unwrap(), address);
        }
    }

    #[test]
    fn rejects_bad_checksum() {
        let broken = "0x5aaeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
        assert_eq!(parse_address(broken), Err(AddressError::Checksum));
    }

    #[test]
    fn accepts_single_case_and_missing_prefix() {
        assert!(is_valid_address("0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED"));
        assert!(is_valid_address("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
        assert!(is_valid_address("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
    }

    #[test]
    fn rejects_wrong_length_and_garbage() {
        assert_eq!(parse_address("0x1234"), Err(AddressError::Length(4)));
        assert_eq!(
            parse_address("0xzzaeb6053f3e94c9b9a09f33669435e7ef1beaed"),
            Err(AddressError::NotHex)
        );
        assert!(!is_valid_address(""));
    }

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "checksummed")]
        account: Address,
        #[serde(with = "checksummed::option", default)]
        backup: Option<Address>,
    }

    #[test]
    fn serde_helpers_write_checksummed_and_validate() {
        let holder = Holder {
            account: parse_address(CHECKSUMMED[0]).unwrap(),
            backup: None,
        };
        let json = serde_json::to_string(&holder).unwrap();
        assert_eq!(
            json,
            format!("{{\"account\":\"{}\",\"backup\":null}}", CHECKSUMMED[0])
        );

        let bad = r#"{"account":"0x5aaeb6053F3E94C9b9A09f33669435E7Ef1BeAed"}"#;
        assert!(serde_json::from_str::<Holder>(bad).is_err());
    }
}
