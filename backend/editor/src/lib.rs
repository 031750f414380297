//! # Recipe Editor
//!
//! Form state and the save workflow behind the recipe create/edit screen.
//!
//! ## Flow
//!
//! 1. [`RecipeEditor::init`] loads the ingredient catalog for the selection
//!    list and, when editing, the recipe itself
//! 2. The caller edits through [`RecipeForm`]: title, instructions, one slot per ingredient
//! 3. [`RecipeEditor::submit`] validates, then updates (editing) or inserts
//!    under the next id (creating), then navigates to the landing route
//!
//! Every failure is logged and handed back as an [`EditorError`]; the form
//! keeps its contents so the user can retry.
pub mod editor;
pub mod error;
pub mod form;
pub mod navigator;

pub use editor::{next_recipe_id, EditorOptions, RecipeEditor, Submission};
pub use error::EditorError;
pub use form::{Control, FieldError, ListRule, RecipeForm};
pub use navigator::{Navigator, LANDING_ROUTE};
