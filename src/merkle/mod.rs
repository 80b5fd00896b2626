pub mod branch;
pub mod coinbase;
pub mod pmt;
pub mod tree;
