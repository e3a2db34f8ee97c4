pub mod errors;
pub mod record;
pub mod reference;
