pub mod bg_remover;
pub mod cleanup;
pub mod credits;
pub mod health;
pub mod payment;
pub mod storage;
pub mod transactions;
pub mod webhook;
pub mod zip;
