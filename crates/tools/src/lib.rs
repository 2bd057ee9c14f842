pub mod ascii;
pub mod utf8;
