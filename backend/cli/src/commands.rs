use std::{pin::pin, sync::Arc};

use anyhow::{anyhow, bail};
use clap::Subcommand;
use editor::{EditorOptions, RecipeEditor, Submission};
use futures::StreamExt;
use gateway::{Gateway, RemoteBackend};
use tokio::signal::ctrl_c;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List recipes, or show one
    Recipes {
        #[arg(long)]
        id: Option<String>,
    },

    /// Show ingredients with their images; the whole catalog when no ids are given
    Ingredients { ids: Vec<String> },

    /// Print the highest recipe id
    LastId,

    /// Create a recipe, or update one with --id
    Save {
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        instructions: Option<String>,

        /// Replaces the recipe's ingredient list when given
        #[arg(long = "ingredient")]
        ingredients: Vec<String>,

        #[arg(long)]
        require_ingredient: bool,
    },

    /// List shared recipes and their progress
    Shared,

    /// Log a completed step in a shared recipe
    Step { shared_recipe: i64, step: i64 },

    /// Log one step per second in a shared recipe
    Cook { shared_recipe: i64, steps: i64 },

    Register { email: String, password: String },

    Logout,

    Whoami,
}

type Remote = Arc<Gateway<RemoteBackend>>;

pub async fn run(command: Command, gateway: Remote) -> anyhow::Result<()> {
    match command {
        Command::Recipes { id } => {
            for recipe in gateway.get_meals(id.as_deref()).await? {
                println!(
                    "{} {} ({} ingredients)",
                    recipe.id.as_deref().unwrap_or("?"),
                    recipe.title,
                    recipe.filled_ingredient_ids().count()
                );
            }
        }
        Command::Ingredients { ids } if ids.is_empty() => {
            for ingredient in gateway.get_all_ingredients().await? {
                println!("{} {}", ingredient.id, ingredient.name);
            }
        }
        Command::Ingredients { ids } => {
            let ids: Vec<Option<String>> = ids.into_iter().map(Some).collect();
            let mut ingredients = pin!(gateway.get_ingredients(&ids).await?);

            while let Some(ingredient) = ingredients.next().await {
                let image = match &ingredient.image {
                    Some(image) => format!("{} bytes", image.len()),
                    None => "no image".to_string(),
                };
                println!("{} {} [{image}]", ingredient.id, ingredient.name);
            }
        }
        Command::LastId => println!("{}", gateway.get_last_recipe_id().await?),
        Command::Save {
            id,
            title,
            instructions,
            ingredients,
            require_ingredient,
        } => save(gateway, id, title, instructions, ingredients, require_ingredient).await?,
        Command::Shared => {
            let user = gateway.get_user_info().await?;

            for shared in gateway.get_shared_recipes().await? {
                let title = shared.recipe.as_ref().map_or("?", |r| r.title.as_str());
                let mine = user
                    .as_ref()
                    .and_then(|u| shared.latest_step(&u.id))
                    .map_or("-".to_string(), |step| step.to_string());

                println!(
                    "{} {title}: {} events, your last step {mine}",
                    shared.id,
                    shared.events.len()
                );
            }
        }
        Command::Step {
            shared_recipe,
            step,
        } => {
            let user = signed_in(&gateway).await?;
            gateway
                .create_shared_recipe_event(shared_recipe, step, &user)
                .await?;
        }
        Command::Cook {
            shared_recipe,
            steps,
        } => {
            let user = signed_in(&gateway).await?;
            let mut ticker = gateway.tick_interval();

            let session = async {
                for step in 1..=steps {
                    ticker.tick().await;
                    gateway
                        .create_shared_recipe_event(shared_recipe, step, &user)
                        .await?;
                    info!("Step {step}/{steps} logged");
                }
                anyhow::Ok(())
            };

            tokio::select! {
                result = session => result?,
                _ = ctrl_c() => info!("Received Ctrl+C, stopping"),
            }
        }
        Command::Register { email, password } => {
            let data = gateway.registration(&email, &password).await?;
            match data.session {
                Some(_) => println!("Registered and signed in as {email}"),
                None => println!("Registered {email}, confirm the email to sign in"),
            }
        }
        Command::Logout => gateway.logout().await?,
        Command::Whoami => match gateway.get_user_info().await? {
            Some(user) => println!("{} {}", user.id, user.email.unwrap_or_default()),
            None => println!("Not signed in"),
        },
    }

    Ok(())
}

async fn signed_in(gateway: &Remote) -> anyhow::Result<String> {
    gateway
        .get_user_info()
        .await?
        .map(|user| user.id)
        .ok_or_else(|| anyhow!("Sign in with --email and --password first"))
}

async fn save(
    gateway: Remote,
    id: Option<String>,
    title: Option<String>,
    instructions: Option<String>,
    ingredients: Vec<String>,
    require_ingredient: bool,
) -> anyhow::Result<()> {
    let navigator = |route: &str| info!("Navigating to {route}");
    let options = EditorOptions {
        require_ingredient,
        ..Default::default()
    };
    let mut editor = RecipeEditor::new(gateway, navigator, id).with_options(options);

    editor.init().await?;

    let form = editor.form_mut();
    if let Some(title) = title {
        form.set_title(title);
        form.touch_title();
    }
    if let Some(instructions) = instructions {
        form.set_instructions(instructions);
        form.touch_instructions();
    }
    if !ingredients.is_empty() {
        while form.remove_ingredient(0) {}
        for ingredient in ingredients {
            form.push_ingredient(ingredient);
        }
    }

    match editor.submit().await? {
        Submission::Invalid => bail!("Recipe not saved: {:?}", editor.form().errors()),
        Submission::Created(recipe) => println!("Created {}", recipe.id.unwrap_or_default()),
        Submission::Updated(recipe) => println!("Updated {}", recipe.id.unwrap_or_default()),
    }

    Ok(())
}
