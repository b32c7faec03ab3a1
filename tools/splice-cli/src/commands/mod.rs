pub mod check;
pub mod compile;
pub mod export;
pub mod info;
pub mod init;
pub mod validate;
