//! CLI for meshscope: live maps of the processes, containers and hosts in a fleet.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "meshscope")]
#[command(about = "meshscope: live topology maps merged from probe reports")]
#[command(version = meshscope_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the app server: ingest probe reports and stream rendered views
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value = "4040")]
        port: u16,

        /// How often streams re-render without new reports (e.g. 1s, 500ms)
        #[arg(long, default_value = "1s")]
        interval: String,

        /// Drop a stream whose client takes longer than this to accept a message
        #[arg(long, default_value = "10s")]
        write_timeout: String,

        /// Largest accepted report body, in MiB
        #[arg(long, default_value = "64")]
        max_report_mb: usize,

        /// Report files to merge into the store before serving
        #[arg(long = "seed")]
        seed: Vec<String>,
    },

    /// Render a view of one or more report files as JSON
    Render {
        /// View name (applications, containers, hosts, ...)
        view: String,

        /// Report files, merged before rendering. Gzip is detected automatically.
        #[arg(required = true)]
        reports: Vec<String>,

        /// Keep adjacency to nodes outside the view
        #[arg(long)]
        unpruned: bool,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<String>,
    },

    /// Merge report files into a single report
    Merge {
        /// Report files to merge
        #[arg(required = true)]
        reports: Vec<String>,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<String>,
    },

    /// Show what a client streaming a view would receive between two states
    Diff {
        /// View name
        view: String,

        /// Reports making up the earlier state
        #[arg(long, required = true, num_args = 1..)]
        before: Vec<String>,

        /// Reports making up the later state
        #[arg(long, required = true, num_args = 1..)]
        after: Vec<String>,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<String>,
    },

    /// Show the detail view of one rendered node
    Detail {
        /// View name
        view: String,

        /// Rendered node ID (e.g. "process_name:nginx")
        id: String,

        /// Report files, merged before rendering
        #[arg(required = true)]
        reports: Vec<String>,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<String>,
    },

    /// List every view with node and edge counts
    Topologies {
        /// Report files, merged before rendering
        #[arg(required = true)]
        reports: Vec<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            interval,
            write_timeout,
            max_report_mb,
            seed,
        } => commands::serve::run(commands::serve::ServeCommandConfig {
            host,
            port,
            interval: &interval,
            write_timeout: &write_timeout,
            max_report_mb,
            seed: &seed,
        }),
        Commands::Render {
            view,
            reports,
            unpruned,
            output,
        } => commands::render::run(&view, &reports, unpruned, output.as_deref()),
        Commands::Merge { reports, output } => commands::merge::run(&reports, output.as_deref()),
        Commands::Diff {
            view,
            before,
            after,
            output,
        } => commands::diff::run(&view, &before, &after, output.as_deref()),
        Commands::Detail {
            view,
            id,
            reports,
            output,
        } => commands::detail::run(&view, &id, &reports, output.as_deref()),
        Commands::Topologies { reports, json } => commands::topologies::run(&reports, json),
    }
}
