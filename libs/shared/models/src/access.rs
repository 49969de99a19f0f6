use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// Operations gated by role. Routers attach one capability per route group
/// and the authorization middleware resolves it against [`ACCESS_POLICY`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewStaff,
    ManageStaff,
    ViewPatients,
    ManagePatients,
    ViewBookings,
    ManageAppointments,
    ManageConsultations,
    ViewInventory,
    ManageInventory,
}

const ALL_STAFF: &[Role] = &[
    Role::Admin,
    Role::Doctor,
    Role::Nurse,
    Role::Secretary,
    Role::Pharmacist,
    Role::Technician,
];

pub const ACCESS_POLICY: &[(Capability, &[Role])] = &[
    (Capability::ViewStaff, ALL_STAFF),
    (Capability::ManageStaff, &[Role::Admin]),
    (Capability::ViewPatients, ALL_STAFF),
    (
        Capability::ManagePatients,
        &[Role::Admin, Role::Doctor, Role::Nurse, Role::Secretary],
    ),
    (Capability::ViewBookings, ALL_STAFF),
    (
        Capability::ManageAppointments,
        &[Role::Admin, Role::Doctor, Role::Nurse, Role::Secretary],
    ),
    (
        Capability::ManageConsultations,
        &[Role::Admin, Role::Doctor, Role::Nurse],
    ),
    (Capability::ViewInventory, ALL_STAFF),
    (
        Capability::ManageInventory,
        &[Role::Admin, Role::Pharmacist],
    ),
];

pub fn role_grants(role: Role, capability: Capability) -> bool {
    ACCESS_POLICY
        .iter()
        .find(|(cap, _)| *cap == capability)
        .map(|(_, roles)| roles.contains(&role))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admin_manages_staff() {
        for role in Role::ALL {
            assert_eq!(role_grants(role, Capability::ManageStaff), role == Role::Admin);
        }
    }

    #[test]
    fn secretaries_book_appointments_but_not_consultations() {
        assert!(role_grants(Role::Secretary, Capability::ManageAppointments));
        assert!(!role_grants(Role::Secretary, Capability::ManageConsultations));
    }

    #[test]
    fn every_role_can_read_bookings() {
        assert!(Role::ALL.iter().all(|role| role_grants(*role, Capability::ViewBookings)));
    }

    #[test]
    fn inventory_is_managed_by_pharmacy() {
        assert!(role_grants(Role::Pharmacist, Capability::ManageInventory));
        assert!(!role_grants(Role::Doctor, Capability::ManageInventory));
    }
}
