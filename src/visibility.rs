// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Scope rules shared by broadcast fan-out and timeline reads.

use crate::event::CanonEvent;
use crate::types::enums::Scope;
use crate::types::id::UserId;

/// May `viewer` see `event`? `is_connection` answers whether the viewer is a
/// trusted connection of the owner and is only consulted for `connections`.
pub fn visible_to(event: &CanonEvent, viewer: &UserId, is_connection: impl FnOnce() -> bool) -> bool {
    if &event.owner_id == viewer {
        return true;
    }
    match event.scope {
        Scope::Private => false,
        Scope::Connections => is_connection(),
        Scope::Public => true,
    }
}
