//! `Slot` and `Epoch` wrap a `u64` so the two units cannot be mixed up. Each can be compared
//! with and offset by a raw `u64`, but never combined with the other.
use serde::{Deserialize, Serialize};
use ssz::{Decode, DecodeError, Encode};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(u64);

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(u64);

u64_newtype!(Slot);
u64_newtype!(Epoch);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_saturate() {
        assert_eq!(Slot::new(u64::MAX) + 1, Slot::new(u64::MAX));
        assert_eq!(Epoch::new(1) - 5, Epoch::new(0));
        assert_eq!(Slot::new(3) + 4, 7_u64);
    }

    #[test]
    fn ordering_follows_inner_value() {
        assert!(Epoch::new(2) > Epoch::new(1));
        assert!(Slot::new(9) < 10_u64);
        assert_eq!(u64::from(Epoch::from(12_u64)), 12);
    }

    #[test]
    fn formatting() {
        assert_eq!(Slot::new(5).to_string(), "5");
        assert_eq!(format!("{:?}", Epoch::new(5)), "Epoch(5)");
    }

    #[test]
    fn ssz_matches_u64() {
        let slot = Slot::new(42);
        let bytes = slot.as_ssz_bytes();
        assert_eq!(bytes, 42_u64.as_ssz_bytes());
        assert_eq!(Slot::from_ssz_bytes(&bytes).unwrap(), slot);
        assert!(Epoch::from_ssz_bytes(&[0; 7]).is_err());
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&Epoch::new(7)).unwrap();
        assert_eq!(json, "7");
        assert_eq!(serde_json::from_str::<Epoch>(&json).unwrap(), Epoch::new(7));
    }
}
