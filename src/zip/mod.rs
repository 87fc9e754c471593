//! Read side of the ZIP format, over any random-access source.
//!
//! - `structures`: fixed-size records (EOCD, ZIP64 locator and EOCD,
//!   Central Directory entries), name decoding and DOS timestamp packing
//! - `parser`: finds the Central Directory from the end of any
//!   [`ReadAt`](crate::io::ReadAt) source and walks it lazily; decodes
//!   and checksums single entries
//!
//! Reading starts at the tail: the EOCD record points at the Central
//! Directory, which names every entry and where its Local File Header
//! sits. Nothing before the Central Directory is touched until an entry
//! is read, so a remote archive can be listed with a few range requests.
//!
//! Only STORED and DEFLATE are understood. Encrypted entries and
//! multi-disk archives are rejected. Writing goes through the `zip`
//! crate (see [`inject`](crate::inject)).

mod parser;
mod structures;

pub use parser::{EntryCursor, ZipParser};
pub use structures::*;
