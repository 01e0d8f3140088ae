pub(crate) mod actor;
pub(crate) mod assistant;
pub(crate) mod binding;
pub(crate) mod handle;
pub(crate) mod instances;
pub(crate) mod message;
