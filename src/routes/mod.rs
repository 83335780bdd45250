pub mod anamnesis;
pub mod credits;
pub mod payments;
pub mod webhook;
