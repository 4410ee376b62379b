pub mod logging;
pub mod sop_classes;
pub mod status;
pub mod transfer_syntaxes;
pub mod types;
