//! Edit rights. Admins may edit anything in their realm; everyone else may
//! edit what they created or what is currently assigned to them.

use crate::models::{Milestone, SubSubtask, Subtask, Task, TempTask};
use crate::session::Session;
use uuid::Uuid;

/// Anything with an owner and, optionally, an assignee.
pub trait Editable {
    fn realm_id(&self) -> Uuid;
    fn created_by(&self) -> Option<Uuid>;
    fn assigned_to(&self) -> Option<Uuid> {
        None
    }
}

impl Editable for Task {
    fn realm_id(&self) -> Uuid {
        self.realm_id
    }
    fn created_by(&self) -> Option<Uuid> {
        self.created_by
    }
}

impl Editable for Subtask {
    fn realm_id(&self) -> Uuid {
        self.realm_id
    }
    fn created_by(&self) -> Option<Uuid> {
        self.created_by
    }
    fn assigned_to(&self) -> Option<Uuid> {
        self.assigned_to
    }
}

impl Editable for SubSubtask {
    fn realm_id(&self) -> Uuid {
        self.realm_id
    }
    fn created_by(&self) -> Option<Uuid> {
        self.created_by
    }
    fn assigned_to(&self) -> Option<Uuid> {
        self.assigned_to
    }
}

impl Editable for Milestone {
    fn realm_id(&self) -> Uuid {
        self.realm_id
    }
    fn created_by(&self) -> Option<Uuid> {
        self.created_by
    }
}

impl Editable for TempTask {
    fn realm_id(&self) -> Uuid {
        self.realm_id
    }
    fn created_by(&self) -> Option<Uuid> {
        self.created_by
    }
    fn assigned_to(&self) -> Option<Uuid> {
        self.user_id
    }
}

pub fn can_edit<E: Editable + ?Sized>(session: &Session, target: &E) -> bool {
    if target.realm_id() != session.realm_id {
        return false;
    }
    if session.is_admin() {
        return true;
    }
    let me = Some(session.user_id);
    target.created_by() == me || target.assigned_to() == me
}
