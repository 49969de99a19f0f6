pub mod registry;

pub use registry::PatientService;
