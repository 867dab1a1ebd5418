//! HTTP route handlers

pub mod evidence;
pub mod lookup;
pub mod scan;
