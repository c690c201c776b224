use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use csolr_api::{SearchBackend, SolrBackend};
use csolr_core::{Entity, EntityKind, Guid, SearchRequest, SortDirection};
use csolr_index::IndexOutcome;
use csolr_persist::{SettingsStore, SqliteStore, SEARCH_SETTINGS, SETTINGS_PLUGIN};
use csolr_search::{FacetSettings, FilterInput, FilterValue, SearchTuning};
use csolr_solr::{HttpSolr, SolrConfig};
use serde::Deserialize;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "csolrctl", version, about = "community-solr operator CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Solr core URL (overrides CSOLR_SOLR_URL)
    #[arg(long = "solr", global = true)]
    solr: Option<String>,

    /// Skip commits after updates
    #[arg(long = "nocommit", global = true, action = ArgAction::SetTrue)]
    nocommit: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search plugin projects
    Search {
        /// Free-text query
        query: Option<String>,
        /// Facet filter as KEY=VALUE with KEY one of t, c, l, v, s (repeatable)
        #[arg(short = 'f', long = "filter")]
        filters: Vec<String>,
        /// Only plugins owned by this username
        #[arg(long = "owner")]
        owner: Option<String>,
        /// Plugin category tag filter
        #[arg(long = "category")]
        category: Option<String>,
        #[arg(long = "offset", default_value_t = 0)]
        offset: usize,
        #[arg(long = "limit", default_value_t = 10)]
        limit: usize,
        /// Apply filters even when the facet is disabled in settings
        #[arg(long = "all-facets", action = ArgAction::SetTrue)]
        all_facets: bool,
    },
    /// Index one catalog entity
    Index { guid: Guid },
    /// Index every plugin project in the catalog
    Reindex,
    /// Remove a document from the index
    Delete { guid: Guid },
    /// Load entities and users from a JSON file into the catalog
    Import { path: String },
    /// Read or write the search settings blob
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Serve the search pages
    Serve {
        #[arg(long = "listen", env = "CSOLR_LISTEN", default_value = "127.0.0.1:8080")]
        listen: SocketAddr,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the stored blob and the facets it enables
    Get,
    /// Store a JSON blob, e.g. '{"text":["enabled"],"category":["enabled"]}'
    Set { blob: String },
}

/// `csolrctl import` file layout.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default)]
    users: Vec<CatalogUser>,
}

#[derive(Debug, Deserialize)]
struct CatalogUser { guid: Guid, username: String }

fn init_tracing() {
    let env = std::env::var("CSOLR_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CSOLR_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid CSOLR_METRICS_ADDR; expected host:port");
        }
    }
}

/// Turn `KEY=VALUE` arguments into the filter map the page would decode.
/// `c`, `l` and `v` collect into lists; `t` and `s` are scalars.
fn parse_filter_args(args: &[String]) -> Result<FilterInput> {
    let mut out = FilterInput::new();
    for arg in args {
        let (key, value) = arg.split_once('=').ok_or_else(|| anyhow!("filter {:?} is not KEY=VALUE", arg))?;
        match key {
            "c" | "l" | "v" => match out.entry(key.to_string()).or_insert_with(|| FilterValue::List(Vec::new())) {
                FilterValue::List(list) => list.push(value.to_string()),
                FilterValue::Scalar(_) => bail!("filter {} given twice with different shapes", key),
            },
            "t" | "s" => { out.insert(key.to_string(), FilterValue::Scalar(value.to_string())); }
            other => bail!("unknown filter key {:?} (expected t, c, l, v or s)", other),
        }
    }
    Ok(out)
}

fn solr_config(cli: &Cli) -> SolrConfig {
    let mut cfg = SolrConfig::from_env();
    if let Some(url) = &cli.solr { cfg.base_url = url.trim_end_matches('/').to_string(); }
    if cli.nocommit { cfg.nocommit = true; }
    cfg
}

fn backend(cfg: &SolrConfig, store: Arc<SqliteStore>) -> Result<SolrBackend> {
    let solr = Arc::new(HttpSolr::new(cfg.clone()).context("building solr client")?);
    Ok(SolrBackend::new(solr, store, SearchTuning::from_env()).with_config(cfg))
}

fn print_outcome(output: Output, guid: Guid, outcome: &IndexOutcome) -> Result<()> {
    match output {
        Output::Human => match outcome {
            IndexOutcome::Indexed(doc) => println!("indexed {} ({} tags, versions: {})", guid, doc.tags.len(), doc.version_ss.join(",")),
            IndexOutcome::Skipped => println!("skipped {} (kind not registered)", guid),
        },
        Output::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Search { query, filters, owner, category, offset, limit, all_facets } => {
            let store = Arc::new(SqliteStore::open_default()?);
            let settings = if *all_facets {
                FacetSettings::all_enabled()
            } else {
                FacetSettings::from_blob(store.get_setting(SETTINGS_PLUGIN, SEARCH_SETTINGS)?.as_deref())
            };
            let input = parse_filter_args(filters)?;
            let decoded = csolr_search::decode(&input, owner.as_deref(), &settings, store.as_ref()).await;
            let text = query.clone().or(decoded.query).unwrap_or_default();
            let req = SearchRequest::new(*offset, *limit)?
                .with_query(text)
                .with_fq(decoded.fq)
                .with_sort("created", SortDirection::Desc)
                .with_category(category.clone());
            info!(query = %req.query, fq = req.fq.len(), "search invoked");
            let b = backend(&solr_config(&cli), store)?;
            match b.search(&req).await {
                Ok(res) => match cli.output {
                    Output::Human => {
                        println!("{}", csolr_web::views::heading(res.count, *offset, *limit));
                        for h in &res.hits {
                            println!("{:<8} {}", h.entity.guid, csolr_search::snippet::strip_tags(&h.matched_title));
                            println!("         {}", csolr_search::snippet::strip_tags(&h.matched_description));
                        }
                    }
                    Output::Json => println!("{}", serde_json::to_string_pretty(&res)?),
                },
                Err(e) => {
                    error!(error = %e, "search failed");
                    bail!("search failed: {}", e);
                }
            }
        }
        Commands::Index { guid } => {
            let store = Arc::new(SqliteStore::open_default()?);
            let entity = store.get_entity(*guid)?.ok_or_else(|| anyhow!("entity {} not in catalog", guid))?;
            let b = backend(&solr_config(&cli), store)?;
            let outcome = b.index(&entity).await;
            print_outcome(cli.output, *guid, &outcome)?;
        }
        Commands::Reindex => {
            let t0 = Instant::now();
            let store = Arc::new(SqliteStore::open_default()?);
            let guids = store.entity_guids(&EntityKind::plugin_project())?;
            let b = backend(&solr_config(&cli), store.clone())?;
            let (mut indexed, mut skipped, mut missing) = (0usize, 0usize, 0usize);
            for chunk in guids.chunks(100) {
                let found = store.entities(chunk)?;
                missing += chunk.len() - found.len();
                for entity in &found {
                    match b.index(entity).await {
                        IndexOutcome::Indexed(_) => indexed += 1,
                        IndexOutcome::Skipped => skipped += 1,
                    }
                }
            }
            info!(indexed, skipped, missing, took_ms = %t0.elapsed().as_millis(), "reindex done");
            match cli.output {
                Output::Human => println!("reindexed {} plugin projects ({} skipped, {} unreadable)", indexed, skipped, missing),
                Output::Json => println!("{}", serde_json::json!({ "indexed": indexed, "skipped": skipped, "missing": missing })),
            }
        }
        Commands::Delete { guid } => {
            let store = Arc::new(SqliteStore::open_default()?);
            let b = backend(&solr_config(&cli), store)?;
            b.delete(*guid).await?;
            println!("deleted {}", guid);
        }
        Commands::Import { path } => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
            let file: CatalogFile = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))?;
            let store = SqliteStore::open_default()?;
            for e in &file.entities { store.put_entity(e)?; }
            for u in &file.users { store.put_user(u.guid, &u.username)?; }
            info!(entities = file.entities.len(), users = file.users.len(), "import done");
            println!("imported {} entities, {} users", file.entities.len(), file.users.len());
        }
        Commands::Settings { action } => {
            let store = SqliteStore::open_default()?;
            match action {
                SettingsAction::Get => {
                    let blob = store.get_setting(SETTINGS_PLUGIN, SEARCH_SETTINGS)?;
                    let facets = FacetSettings::from_blob(blob.as_deref());
                    match cli.output {
                        Output::Human => {
                            println!("blob: {}", blob.as_deref().unwrap_or("(unset)"));
                            println!("text={} category={} license={} version={} screenshot={}", facets.text, facets.category, facets.license, facets.version, facets.screenshot);
                        }
                        Output::Json => println!("{}", blob.unwrap_or_else(|| "null".to_string())),
                    }
                }
                SettingsAction::Set { blob } => {
                    let _: serde_json::Value = serde_json::from_str(blob).context("settings blob must be JSON")?;
                    store.set_setting(SETTINGS_PLUGIN, SEARCH_SETTINGS, blob)?;
                    println!("stored {}", FacetSettings::from_blob(Some(blob)).to_blob());
                }
            }
        }
        Commands::Serve { listen } => {
            let state = Arc::new(csolr_web::AppState::from_env()?);
            csolr_web::serve(*listen, state).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn filter_args_follow_page_shapes() {
        let f = parse_filter_args(&args(&["c=tools", "c=themes", "s=1", "t=seo"])).unwrap();
        assert_eq!(f.get("c"), Some(&FilterValue::List(vec!["tools".into(), "themes".into()])));
        assert_eq!(f.get("s"), Some(&FilterValue::Scalar("1".into())));
        let decoded = csolr_search::decode_filters(&f, &FacetSettings::all_enabled());
        assert_eq!(decoded.query.as_deref(), Some("seo"));
        assert_eq!(decoded.fq.get("cat"), Some(r#"plugincat_s:("tools","themes")"#));
    }

    #[test]
    fn filter_args_reject_junk() {
        assert!(parse_filter_args(&args(&["nope"])).is_err());
        assert!(parse_filter_args(&args(&["x=1"])).is_err());
    }

    #[test]
    fn catalog_file_parses() {
        let raw = r#"{"entities":[{"guid":1,"kind":{"type":"object","subtype":"plugin_project"},"owner_guid":2,"container_guid":2,"access_id":2,"time_created":0,"title":"A"}],"users":[{"guid":2,"username":"cash"}]}"#;
        let f: CatalogFile = serde_json::from_str(raw).unwrap();
        assert_eq!(f.entities[0].title, "A");
        assert_eq!(f.users[0].username, "cash");
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::parse_from(["csolrctl", "-o", "json", "search", "seo", "-f", "c=tools", "--limit", "5"]);
        assert_eq!(cli.output, Output::Json);
        assert!(matches!(cli.command, Commands::Search { limit: 5, .. }));
        let cli = Cli::parse_from(["csolrctl", "settings", "set", "{}"]);
        assert!(matches!(cli.command, Commands::Settings { action: SettingsAction::Set { .. } }));
    }
}
