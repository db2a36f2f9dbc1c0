#![allow(unused_imports)]

pub use super::mint_transaction::Entity as MintTransaction;
