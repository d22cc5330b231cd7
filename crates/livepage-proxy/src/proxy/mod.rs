//! Upstream forwarding: the live origin (with interception) and the local
//! dev server (verbatim).

pub mod correlation;
pub mod forward;
pub mod live;
pub mod local;
