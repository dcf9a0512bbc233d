//! Authorization boundary.
//!
//! Identity and role authorization live outside the engine. Every engine operation receives
//! the acting [`Actor`] and asks the injected [`AccessPolicy`] once, up front, whether that
//! role may perform the [`Operation`]. The engine itself never inspects role names.

use serde::{Deserialize, Serialize};
use std::fmt;
use ward_uuid::{AdmissionId, UserId, WardId};

/// Staff role as supplied by the identity collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Doctor,
    Nurse,
    /// Internal jobs such as the periodic materializer tick.
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "nurse" => Ok(Role::Nurse),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: '{other}'")),
        }
    }
}

/// The authenticated user performing an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    /// The actor used by internal jobs.
    pub fn system() -> Self {
        Self {
            id: UserId::from_uuid(uuid::Uuid::nil()),
            role: Role::System,
        }
    }
}

/// Every state-changing or reading operation the engine exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ManageRegistry,
    ViewRegistry,
    Admit,
    Discharge,
    Transfer,
    RecordDeath,
    ViewAdmissions,
    CreateOrder,
    ApproveOrder,
    UpdateOrder,
    ViewOrders,
    ManageSchedule,
    MaterializeTasks,
    AdministerMedication,
    VerifyAdministration,
    ViewMedication,
    RecordVitals,
    ViewVitals,
    RaiseEmergency,
    RespondEmergency,
    ViewEmergencies,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ManageRegistry => "manage the bed registry",
            Operation::ViewRegistry => "view the bed registry",
            Operation::Admit => "admit patients",
            Operation::Discharge => "discharge patients",
            Operation::Transfer => "transfer patients",
            Operation::RecordDeath => "record a death",
            Operation::ViewAdmissions => "view admissions",
            Operation::CreateOrder => "create doctor orders",
            Operation::ApproveOrder => "approve doctor orders",
            Operation::UpdateOrder => "update doctor orders",
            Operation::ViewOrders => "view doctor orders",
            Operation::ManageSchedule => "manage medication schedules",
            Operation::MaterializeTasks => "materialize medication tasks",
            Operation::AdministerMedication => "administer medication",
            Operation::VerifyAdministration => "verify medication administration",
            Operation::ViewMedication => "view medication records",
            Operation::RecordVitals => "record vitals",
            Operation::ViewVitals => "view vitals",
            Operation::RaiseEmergency => "raise emergency events",
            Operation::RespondEmergency => "respond to emergency events",
            Operation::ViewEmergencies => "view emergency events",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the operation touches, for policies that scope by ward or stay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceContext {
    pub ward_id: Option<WardId>,
    pub admission_id: Option<AdmissionId>,
}

impl ResourceContext {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn ward(ward_id: WardId) -> Self {
        Self {
            ward_id: Some(ward_id),
            admission_id: None,
        }
    }

    pub fn admission(admission_id: AdmissionId) -> Self {
        Self {
            ward_id: None,
            admission_id: Some(admission_id),
        }
    }
}

pub trait AccessPolicy: Send + Sync {
    fn can(&self, role: Role, operation: Operation, context: &ResourceContext) -> bool;
}

/// Permits everything. For deployments where the gateway already enforced roles.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can(&self, _role: Role, _operation: Operation, _context: &ResourceContext) -> bool {
        true
    }
}

/// A conventional ward role mapping.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoleMatrix;

impl AccessPolicy for RoleMatrix {
    fn can(&self, role: Role, operation: Operation, _context: &ResourceContext) -> bool {
        use Operation::*;

        match role {
            Role::System => matches!(
                operation,
                MaterializeTasks | ManageRegistry | ViewRegistry | ViewMedication
            ),
            Role::Admin => matches!(
                operation,
                ManageRegistry | ViewRegistry | Admit | Discharge | Transfer | ViewAdmissions
            ),
            Role::Doctor => !matches!(operation, ManageRegistry),
            Role::Nurse => matches!(
                operation,
                ViewRegistry
                    | ViewAdmissions
                    | ViewOrders
                    | MaterializeTasks
                    | AdministerMedication
                    | VerifyAdministration
                    | ViewMedication
                    | RecordVitals
                    | ViewVitals
                    | RaiseEmergency
                    | ViewEmergencies
            ),
        }
    }
}
