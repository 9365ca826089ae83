// SPDX-License-Identifier: MIT

//! External collaborators (C6 "opaque capabilities"): the stage handler
//! contract, notifications, metadata lookup, and the organizer — every
//! one with a usable no-op or real default so the pipeline runs without
//! any of them actually configured.

pub mod metadata;
pub mod notify;
pub mod organizer;
pub mod stage;

pub use metadata::{MetadataClient, MetadataError, MetadataMatch, NoopMetadataClient};
pub use notify::{DesktopNotifierAdapter, NotifierAdapter, NotifyError};
pub use organizer::{final_filename, review_filename, DefaultOrganizer, OrganizeError, OrganizerStageHandler};
pub use stage::{HealthStatus, NoopStageHandler, StageContext, StageHandler};
