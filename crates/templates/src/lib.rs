//! Template rendering for notification content.
//!
//! `renderer` is a pure function over `{{var}}` substitution, `{{#if}}`
//! conditionals and `{{#each}}` iteration. `store` resolves the stored
//! template for a (type, channel, locale) with tenant and locale fallback.

pub mod renderer;
pub mod store;

pub use renderer::render;
pub use store::TemplateStore;
