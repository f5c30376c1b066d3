pub mod coin_select;
pub mod deposit;
pub mod htlc;
pub mod keys;
pub mod network;
pub mod rpc;
pub mod spend;
pub mod verify;
