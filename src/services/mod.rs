//! Account provisioning core: naming, secrets, the storage gateway, the
//! orchestrator and credential delivery.

pub mod account_service;
pub mod naming;
pub mod notifier;
pub mod secret;
pub mod storage;

#[cfg(test)]
pub mod testing;
