//! # Completion record
//!
//! ```text
//! 0      1       3              (BYTE)
//! +------+-------+
//! |status| count |
//! +------+-------+---------------+
//! |  id  |  id  | ... (count)    |
//! +------+------+----------------+
//! ```
//!
//! Every field is big-endian. `status` applies to every `id` in the record.
//! A completion buffer carries one or more records back to back.
//!
//! # Traffic identifiers
//!
//! TIDs 0-7 map onto the four access categories per 802.1D user priority.

pub mod completion;
pub mod qos;

#[derive(Debug)]
pub enum DecodingError {
    Decoding { field: &'static str },
}
