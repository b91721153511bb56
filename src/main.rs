use std::time::Duration;

use chrono::Local;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod events;
mod filter;
mod impute;
mod ingest;
mod normalize;
mod recipes;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;

use app::AppFactory;
use cli::{CategoryArgs, Command};
use events::{RecipeView, SearchId};
use filter::CategoryFilter;
use recipes::{NationCode, TypeCode};

impl From<CategoryArgs> for CategoryFilter {
    fn from(args: CategoryArgs) -> Self {
        CategoryFilter::new(args.nation.map(NationCode), args.kind.map(TypeCode))
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let paths = AppFactory::get_paths()?;
    let app = AppFactory::create_app(&paths)?;

    match args.command {
        Command::Ingest { source, force } => {
            let source = ingest::JsonDumpSource::new(source);
            print_json(&app.ingest(&source, force)?)
        }

        Command::Impute {} => print_json(&app.impute()?),

        Command::Reindex {} => {
            let count = app.reindex()?;
            println!("{} recipe names indexed", count);
            Ok(())
        }

        Command::Search { query, category } => {
            print_json(&app.search_by_name(&query, &category.into())?)
        }

        Command::Ingredient { keyword, category } => {
            print_json(&app.search_by_ingredient(&keyword, &category.into())?)
        }

        Command::Categories {} => print_json(&app.categories()?),

        Command::Show { id } => print_json(&app.detail(id)?),

        Command::View {
            search_id,
            recipe_id,
            seconds,
        } => {
            if !seconds.is_finite() || seconds < 0.0 {
                anyhow::bail!("seconds must be a non-negative number");
            }
            let dwell = Duration::from_secs_f64(seconds);
            let view = RecipeView {
                search_id: SearchId::from(search_id.as_str()),
                recipe_id,
                started_at: Local::now()
                    - chrono::Duration::from_std(dwell).unwrap_or_else(|_| chrono::Duration::zero()),
                dwell,
            };
            if app.record_view(view)? {
                println!("view recorded");
            } else {
                println!("view too short, not recorded");
            }
            Ok(())
        }
    }
}
