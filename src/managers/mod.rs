pub mod dhis_request;
pub mod instance;
pub mod list_instances;
