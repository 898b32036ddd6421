//! The drink menu: domain types and an in-process store.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;

/// One ingredient of a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub color: String,
    pub parts: u32,
}

/// A recipe as posted by clients: a single ingredient or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecipeInput {
    One(Ingredient),
    Many(Vec<Ingredient>),
}

impl RecipeInput {
    fn into_ingredients(self) -> Vec<Ingredient> {
        match self {
            RecipeInput::One(ingredient) => vec![ingredient],
            RecipeInput::Many(ingredients) => ingredients,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDrink {
    pub title: String,
    pub recipe: RecipeInput,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrinkUpdate {
    pub title: Option<String>,
    pub recipe: Option<RecipeInput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drink {
    pub id: u64,
    pub title: String,
    pub recipe: Vec<Ingredient>,
}

impl Drink {
    /// Public view: ingredient names are hidden.
    pub fn short(&self) -> Value {
        let recipe: Vec<Value> = self
            .recipe
            .iter()
            .map(|i| json!({ "color": i.color, "parts": i.parts }))
            .collect();
        json!({ "id": self.id, "title": self.title, "recipe": recipe })
    }

    /// Full view for holders of `get:drinks-detail` and writers.
    pub fn long(&self) -> Value {
        json!({ "id": self.id, "title": self.title, "recipe": self.recipe })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrinkError {
    NotFound(u64),
    DuplicateTitle(String),
    Invalid(String),
}

impl fmt::Display for DrinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrinkError::NotFound(id) => write!(f, "Drink {} not found", id),
            DrinkError::DuplicateTitle(title) => {
                write!(f, "A drink titled '{}' already exists", title)
            }
            DrinkError::Invalid(msg) => write!(f, "Invalid drink: {}", msg),
        }
    }
}

impl std::error::Error for DrinkError {}

/// Drinks kept in memory for the life of the process.
pub struct DrinkStore {
    drinks: RwLock<BTreeMap<u64, Drink>>,
    next_id: AtomicU64,
}

impl Default for DrinkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DrinkStore {
    pub fn new() -> Self {
        Self {
            drinks: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// All drinks ordered by id.
    pub async fn list(&self) -> Vec<Drink> {
        self.drinks.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: u64) -> Option<Drink> {
        self.drinks.read().await.get(&id).cloned()
    }

    pub async fn create(&self, new: NewDrink) -> Result<Drink, DrinkError> {
        let title = validate_title(&new.title)?;
        let recipe = validate_recipe(new.recipe)?;

        let mut drinks = self.drinks.write().await;
        if title_taken(&drinks, &title, None) {
            return Err(DrinkError::DuplicateTitle(title));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let drink = Drink { id, title, recipe };
        drinks.insert(id, drink.clone());
        debug!("Created drink {} '{}'", id, drink.title);
        Ok(drink)
    }

    pub async fn update(&self, id: u64, update: DrinkUpdate) -> Result<Drink, DrinkError> {
        let title = update.title.as_deref().map(validate_title).transpose()?;
        let recipe = update.recipe.map(validate_recipe).transpose()?;

        let mut drinks = self.drinks.write().await;
        if let Some(title) = &title
            && title_taken(&drinks, title, Some(id))
        {
            return Err(DrinkError::DuplicateTitle(title.clone()));
        }

        let drink = drinks.get_mut(&id).ok_or(DrinkError::NotFound(id))?;
        if let Some(title) = title {
            drink.title = title;
        }
        if let Some(recipe) = recipe {
            drink.recipe = recipe;
        }
        debug!("Updated drink {}", id);
        Ok(drink.clone())
    }

    pub async fn delete(&self, id: u64) -> Result<(), DrinkError> {
        if self.drinks.write().await.remove(&id).is_none() {
            return Err(DrinkError::NotFound(id));
        }
        debug!("Deleted drink {}", id);
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<String, DrinkError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DrinkError::Invalid("title must not be empty".to_string()));
    }
    Ok(title.to_string())
}

fn validate_recipe(recipe: RecipeInput) -> Result<Vec<Ingredient>, DrinkError> {
    let ingredients = recipe.into_ingredients();
    if ingredients.is_empty() {
        return Err(DrinkError::Invalid(
            "recipe needs at least one ingredient".to_string(),
        ));
    }
    if let Some(bad) = ingredients
        .iter()
        .find(|i| i.name.trim().is_empty() || i.parts == 0)
    {
        return Err(DrinkError::Invalid(format!(
            "ingredient '{}' needs a name and at least one part",
            bad.name
        )));
    }
    Ok(ingredients)
}

fn title_taken(drinks: &BTreeMap<u64, Drink>, title: &str, except: Option<u64>) -> bool {
    drinks
        .values()
        .any(|d| d.title == title && Some(d.id) != except)
}
