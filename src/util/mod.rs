pub mod bigendian;
pub mod lzw;
