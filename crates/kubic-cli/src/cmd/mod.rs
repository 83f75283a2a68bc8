pub mod check;
pub mod deploy;
pub mod init;
pub mod node;
pub mod reset;
pub mod serve;
