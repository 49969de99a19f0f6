pub mod inventory;

pub use inventory::MedicationService;
