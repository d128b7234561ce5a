//! Fuse register model
//!
//! A family's fuses are described as a map of [`FuseRegister`]s. Each
//! register is either a *leaf* backed by one OTP word (`otp_index`), or a
//! *group* register composed of several leaf members whose values are
//! concatenated (for example a 256-bit key hash spread over eight words).
//!
//! Registers own their [`Bitfield`]s, and bitfields own their named
//! [`FuseEnum`] values. [`FuseRegisters`] is the collection that also tracks
//! which register acts as the lock fuse for which.

mod registers;
mod types;

pub use registers::*;
pub use types::*;
