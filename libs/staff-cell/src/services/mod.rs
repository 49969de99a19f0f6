pub mod directory;

pub use directory::StaffService;
