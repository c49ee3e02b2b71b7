//! Site domain logic for Coinpress.
//!
//! Ties content loading, relatedness, search indexing and feed rendering
//! into the site data build (`site::build_site`).

pub mod catalog;
pub mod related;
pub mod site;
