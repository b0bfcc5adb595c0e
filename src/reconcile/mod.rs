//! Reconciliation — identifier extraction, order matching and dedup.

pub mod dedup;
pub mod extractor;
pub mod matcher;

pub use dedup::{duplicate_keys, is_duplicate_delivery, nid_make_target, DeliveryProbe, NidTarget};
pub use extractor::{
    extract, has_bengali_digits, request_keys, ten_digit_numbers, Candidate, Extraction, IdLabel,
};
pub use matcher::{match_candidates, OrderMatch};
