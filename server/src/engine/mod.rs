pub mod catalog;
pub mod chat_engine;
pub mod evaluator;
pub mod locks;
pub mod membership;
pub mod notifier;
pub mod policy;
pub mod propagation;
pub mod provisioning;
pub mod role_store;
pub mod settings;
pub mod social;
pub mod tier;
pub mod validation;
