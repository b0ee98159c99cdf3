pub mod payouts;
pub mod transfers;
pub mod users;
pub mod wallets;
