//! # Recipe Form
//!
//! Local form state, no remote effects.
//!
//! ## Rules
//! - Title required
//! - Instructions required
//! - Every ingredient slot required once it exists
//! - At least one ingredient, only when the form is built with
//!   [`ListRule::AtLeastOne`]
//!
//! ## Repopulating
//! Loading a recipe rebuilds one slot per filled reference. Unfilled (`null`)
//! references are skipped rather than turned into empty slots, unlike
//! [`RecipeForm::add_ingredient`] which always adds an empty one.
use gateway::models::Recipe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    Required,
}

impl Validator {
    pub fn check(&self, value: &str) -> bool {
        match self {
            Validator::Required => !value.is_empty(),
        }
    }
}

/// Rules over the ingredient list as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListRule {
    AtLeastOne,
}

impl ListRule {
    pub fn check(&self, controls: &[Control]) -> bool {
        match self {
            ListRule::AtLeastOne => !controls.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    Title,
    Instructions,
    Ingredient(usize),
    NoIngredients,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Control {
    value: String,
    touched: bool,
    dirty: bool,
    validators: Vec<Validator>,
}

impl Control {
    pub fn required(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            validators: vec![Validator::Required],
            ..Default::default()
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.dirty = true;
    }

    pub fn touch(&mut self) {
        self.touched = true;
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_valid(&self) -> bool {
        self.validators.iter().all(|v| v.check(&self.value))
    }

    /// New value, back to pristine and untouched.
    pub fn reset(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.touched = false;
        self.dirty = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeForm {
    title: Control,
    instructions: Control,
    ingredients: Vec<Control>,
    ingredient_rules: Vec<ListRule>,
}

impl Default for RecipeForm {
    fn default() -> Self {
        Self::new()
    }
}

impl RecipeForm {
    pub fn new() -> Self {
        Self {
            title: Control::required(""),
            instructions: Control::required(""),
            ingredients: Vec::new(),
            ingredient_rules: Vec::new(),
        }
    }

    pub fn with_ingredient_rule(mut self, rule: ListRule) -> Self {
        self.set_ingredient_rule(rule, true);
        self
    }

    /// Turns `rule` on or off without touching the entered values.
    pub fn set_ingredient_rule(&mut self, rule: ListRule, active: bool) {
        self.ingredient_rules.retain(|r| *r != rule);
        if active {
            self.ingredient_rules.push(rule);
        }
    }

    pub fn title(&self) -> &Control {
        &self.title
    }

    pub fn instructions(&self) -> &Control {
        &self.instructions
    }

    pub fn set_title(&mut self, value: impl Into<String>) {
        self.title.set_value(value);
    }

    pub fn touch_title(&mut self) {
        self.title.touch();
    }

    pub fn set_instructions(&mut self, value: impl Into<String>) {
        self.instructions.set_value(value);
    }

    pub fn touch_instructions(&mut self) {
        self.instructions.touch();
    }

    /// True once the title has been touched and holds a valid value.
    pub fn title_valid(&self) -> bool {
        self.title.is_valid() && self.title.is_touched()
    }

    pub fn ingredients(&self) -> &[Control] {
        &self.ingredients
    }

    /// Appends an empty, required slot.
    pub fn add_ingredient(&mut self) {
        self.ingredients.push(Control::required(""));
    }

    pub fn push_ingredient(&mut self, id: impl Into<String>) {
        self.ingredients.push(Control::required(id));
    }

    pub fn set_ingredient(&mut self, index: usize, id: impl Into<String>) -> bool {
        match self.ingredients.get_mut(index) {
            Some(control) => {
                control.set_value(id);
                true
            }
            None => false,
        }
    }

    pub fn remove_ingredient(&mut self, index: usize) -> bool {
        if index < self.ingredients.len() {
            self.ingredients.remove(index);
            true
        } else {
            false
        }
    }

    pub fn errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if !self.title.is_valid() {
            errors.push(FieldError::Title);
        }

        if !self.instructions.is_valid() {
            errors.push(FieldError::Instructions);
        }

        errors.extend(
            self.ingredients
                .iter()
                .enumerate()
                .filter(|(_, control)| !control.is_valid())
                .map(|(index, _)| FieldError::Ingredient(index)),
        );

        if self
            .ingredient_rules
            .iter()
            .any(|rule| !rule.check(&self.ingredients))
        {
            errors.push(FieldError::NoIngredients);
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }

    pub fn reset_from(&mut self, recipe: &Recipe) {
        self.title.reset(recipe.title.as_str());
        self.instructions.reset(recipe.instructions.as_str());
        self.ingredients = recipe
            .filled_ingredient_ids()
            .map(Control::required)
            .collect();
    }

    /// The form as a recipe payload, carrying `id` when given.
    pub fn value(&self, id: Option<&str>) -> Recipe {
        Recipe {
            id: id.map(str::to_string),
            title: self.title.value.clone(),
            instructions: self.instructions.value.clone(),
            ingredient_ids: self
                .ingredients
                .iter()
                .map(|control| Some(control.value.clone()))
                .collect(),
            ..Default::default()
        }
    }
}
