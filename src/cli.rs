use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CategoryArgs {
    /// Nation code (e.g. 3020001)
    #[clap(short, long)]
    pub nation: Option<u32>,

    /// Dish type code (e.g. 3010001)
    #[clap(short = 't', long = "type")]
    pub kind: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load recipe tables from open-data JSON dumps
    Ingest {
        /// Directory holding the Grid_*.json dumps
        #[clap(short, long)]
        source: PathBuf,

        /// Replace recipes already in the store
        #[clap(short, long, default_value = "false")]
        force: bool,
    },

    /// Predict the calories still missing
    Impute {},

    /// Re-embed every recipe name
    Reindex {},

    /// Search recipes by name similarity
    Search {
        query: String,

        #[clap(flatten)]
        category: CategoryArgs,
    },

    /// Search recipes by ingredient substring
    Ingredient {
        keyword: String,

        #[clap(flatten)]
        category: CategoryArgs,
    },

    /// List the nation and dish type codes accepted by -n and -t
    Categories {},

    /// Show a recipe with its ingredients and steps
    Show { id: u64 },

    /// Record how long a search result was viewed
    View {
        #[clap(long)]
        search_id: String,

        #[clap(long)]
        recipe_id: u64,

        /// Seconds spent on the recipe
        #[clap(long)]
        seconds: f64,
    },
}
