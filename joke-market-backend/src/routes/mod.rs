pub mod batches;
pub mod market;
pub mod rounds;
pub mod roster;
pub mod session;
