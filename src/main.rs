use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::env;

use conflictstats::config::{provenance, Config};
use conflictstats::fetch::BinaryFetchCache;
use conflictstats::formatting::{format_date, normalize_alliance_ids};
use conflictstats::logging::{log, obj, ts_epoch_ms, v_str, Domain, Level};
use conflictstats::model::{Conflict, GraphData, TierMetric};
use conflictstats::table::{self, FormatterRegistry, Grain, SortDir, TableAdapter, TextTableAdapter};
use conflictstats::{aava, bubble, selection, tiering, warweb};

const USAGE: &str = "usage:
  conflictstats info <conflict>
  conflictstats table <conflict> <coalition|alliance|nation> [sort_by] [asc|desc] [layout,csv]
  conflictstats tiering <conflict> <metric[:c][:n]>... [--single-color] [--alliances=1,2,3]
  conflictstats bubble <conflict> <x> <y> <size> [min_city max_city]
  conflictstats aava <conflict> <header|-> <primary ids csv> <compared ids csv>

<conflict> is a numeric id (resolved against CONFLICT_DATA_BASE), a file path or a URL.
--refresh anywhere bypasses the decode cache.";

struct Invocation {
    command: String,
    positional: Vec<String>,
    refresh: bool,
    single_color: bool,
    alliances: Option<Vec<i64>>,
}

fn parse_args() -> Result<Invocation> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        bail!("{}", USAGE);
    };
    let mut inv = Invocation {
        command,
        positional: Vec::new(),
        refresh: false,
        single_color: false,
        alliances: None,
    };
    for arg in args {
        match arg.as_str() {
            "--refresh" => inv.refresh = true,
            "--single-color" => inv.single_color = true,
            other => {
                if let Some(ids) = other.strip_prefix("--alliances=") {
                    let raw: Vec<&str> = ids.split(',').collect();
                    inv.alliances = Some(normalize_alliance_ids(&raw));
                } else {
                    inv.positional.push(other.to_string());
                }
            }
        }
    }
    Ok(inv)
}

fn arg<'a>(inv: &'a Invocation, i: usize, name: &str) -> Result<&'a str> {
    inv.positional
        .get(i)
        .map(String::as_str)
        .with_context(|| format!("missing <{}>\n{}", name, USAGE))
}

fn ids_csv(raw: &str) -> Vec<i64> {
    let parts: Vec<&str> = raw.split(',').collect();
    normalize_alliance_ids(&parts)
}

fn is_conflict_id(source: &str) -> bool {
    !source.is_empty() && source.chars().all(|c| c.is_ascii_digit())
}

async fn load_conflict(cfg: &Config, cache: &BinaryFetchCache, source: &str, refresh: bool) -> Result<Conflict> {
    let url = if is_conflict_id(source) {
        cfg.conflict_url(source)?
    } else {
        source.to_string()
    };
    cache.load_conflict(&url, refresh).await
}

async fn load_graph(cfg: &Config, cache: &BinaryFetchCache, source: &str, refresh: bool) -> Result<GraphData> {
    let url = if is_conflict_id(source) {
        cfg.graph_url(source)?
    } else {
        source.to_string()
    };
    cache.load_graph(&url, refresh).await
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let inv = parse_args()?;
    let cfg = Config::from_env();
    let cache = BinaryFetchCache::from_config(&cfg)?;
    log(
        Level::Info,
        Domain::System,
        "cli_start",
        obj(&[
            ("command", v_str(&inv.command)),
            ("data_base", v_str(&cfg.data_base)),
            ("worker", v_str(if cfg.use_worker { "on" } else { "off" })),
        ]),
    );

    match inv.command.as_str() {
        "info" => {
            let conflict = load_conflict(&cfg, &cache, arg(&inv, 0, "conflict")?, inv.refresh).await?;
            println!("{}", conflict.name);
            println!("{} -> {}", format_date(Some(conflict.start)), format_date(Some(conflict.end)));
            for (i, c) in conflict.coalitions.iter().enumerate() {
                println!(
                    "coalition {}: {} ({} alliances, {} nations)",
                    i + 1,
                    c.name,
                    c.alliance_ids.len(),
                    c.nation_ids.len()
                );
            }
            println!("{}", provenance(&cfg.data_version, None, ts_epoch_ms() as i64));
        }
        "table" => {
            let conflict = load_conflict(&cfg, &cache, arg(&inv, 0, "conflict")?, inv.refresh).await?;
            let grain: Grain = arg(&inv, 1, "grain")?.parse().map_err(anyhow::Error::msg)?;
            let sort_by = inv.positional.get(2).map(String::as_str).unwrap_or("name");
            let dir: SortDir = inv
                .positional
                .get(3)
                .map(|d| d.parse())
                .transpose()
                .map_err(anyhow::Error::msg)?
                .unwrap_or(SortDir::Desc);
            let layout: Vec<String> = match inv.positional.get(4) {
                Some(csv) => csv.split(',').map(str::to_string).collect(),
                None => table::project(&conflict, grain, &[], sort_by, dir).columns,
            };
            let data = table::project(&conflict, grain, &layout, sort_by, dir);
            let mut adapter = TextTableAdapter::new();
            adapter.render(&data, &FormatterRegistry::with_defaults())?;
            println!("{}", adapter.output());
        }
        "tiering" => {
            let data = load_graph(&cfg, &cache, arg(&inv, 0, "conflict")?, inv.refresh).await?;
            let metrics = inv.positional[1..]
                .iter()
                .map(|m| m.parse::<TierMetric>().map_err(anyhow::Error::msg))
                .collect::<Result<Vec<_>>>()?;
            if metrics.is_empty() {
                bail!("tiering needs at least one metric\n{}", USAGE);
            }
            let coalitions: Vec<&[i64]> = data.coalitions.iter().map(|c| c.alliance_ids.as_slice()).collect();
            let allowed: BTreeSet<i64> = match &inv.alliances {
                Some(ids) => ids.iter().copied().collect(),
                None => coalitions.iter().flat_map(|ids| ids.iter().copied()).collect(),
            };
            let selections = selection::per_coalition(&allowed, &coalitions);
            let result = tiering::build(&data, &metrics, &selections, inv.single_color)
                .context("a requested metric is not in this dataset")?;
            print_json(&result)?;
        }
        "bubble" => {
            let data = load_graph(&cfg, &cache, arg(&inv, 0, "conflict")?, inv.refresh).await?;
            let mut metrics = Vec::with_capacity(3);
            for (i, axis) in ["x", "y", "size"].iter().enumerate() {
                metrics.push(arg(&inv, i + 1, axis)?.parse::<TierMetric>().map_err(anyhow::Error::msg)?);
            }
            let metrics: [TierMetric; 3] = metrics
                .try_into()
                .map_err(|_| anyhow::anyhow!("bubble needs exactly three metrics"))?;
            let min_city = inv.positional.get(4).map(|v| v.parse()).transpose()?.unwrap_or(0);
            let max_city = inv.positional.get(5).map(|v| v.parse()).transpose()?.unwrap_or(i64::MAX);
            let result = bubble::build(&data, &metrics, min_city, max_city)
                .context("a requested metric is not in this dataset")?;
            print_json(&result)?;
        }
        "aava" => {
            let conflict = load_conflict(&cfg, &cache, arg(&inv, 0, "conflict")?, inv.refresh).await?;
            let header = match arg(&inv, 1, "header")? {
                "-" => warweb::default_header(&conflict.war_web.headers),
                h => h.to_string(),
            };
            let primary = ids_csv(arg(&inv, 2, "primary ids")?);
            let compared = ids_csv(arg(&inv, 3, "compared ids")?);
            let rows = aava::aggregate(&conflict, &header, &primary, &compared);
            let labels: Vec<(&str, String)> = aava::AAVA_METRIC_KEYS
                .iter()
                .map(|k| (*k, aava::metric_label(k, &header)))
                .collect();
            print_json(&serde_json::json!({
                "note": warweb::MetricMeta::resolve(&header).direction_note(&header),
                "header": header,
                "labels": labels,
                "rows": rows,
            }))?;
        }
        other => bail!("unknown command {:?}\n{}", other, USAGE),
    }
    Ok(())
}
