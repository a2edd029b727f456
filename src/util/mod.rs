pub mod cancel;
pub mod checksum;
