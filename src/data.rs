use crate::config::AppConfig;
use crate::types::{DailyMetrics, StateFeature};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geo::{MultiPolygon, Point};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;

/// Everything the pipeline needs downstream: joined features plus the sorted
/// set of dates the metrics file covers.
pub struct Dataset {
    pub states: Vec<StateFeature>,
    pub dates: Vec<String>,
}

pub fn load_data(config: &AppConfig) -> Result<Dataset> {
    println!("Loading data...");

    // 1. Load per-state daily metrics
    let (metrics, dates) = load_metrics_csv(config)?;
    println!(
        "Loaded metrics for {} states across {} days",
        metrics.len(),
        dates.len()
    );

    // 2. Load geometry and join
    let states = load_geojson_and_join(config, &metrics)?;
    println!("Loaded geometry for {} states", states.len());

    Ok(Dataset { states, dates })
}

type MetricsByState = HashMap<String, HashMap<String, DailyMetrics>>;

fn load_metrics_csv(config: &AppConfig) -> Result<(MetricsByState, Vec<String>)> {
    let file = File::open(&config.input.metrics_csv)
        .with_context(|| format!("Failed to open CSV file: {:?}", config.input.metrics_csv))?;
    let mut rdr = ReaderBuilder::new().from_reader(file);
    let headers = rdr.headers()?.clone();

    // Map column names to indices for positional lookup
    let col_indices: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.to_string(), i))
        .collect();

    let date_idx = *col_indices
        .get("date")
        .ok_or_else(|| anyhow!("Column 'date' not found in CSV"))?;
    let state_idx = *col_indices
        .get("state")
        .ok_or_else(|| anyhow!("Column 'state' not found in CSV"))?;
    let positive_idx = col_indices.get("positive").copied();
    let death_idx = col_indices.get("death").copied();
    let tests_idx = col_indices.get("totalTestResults").copied();

    let mut metrics: MetricsByState = HashMap::new();
    let mut dates = BTreeSet::new();

    for result in rdr.records() {
        let record = result?;
        let state = record.get(state_idx).unwrap_or("").to_string();
        let date = record.get(date_idx).unwrap_or("").to_string();

        if state.is_empty() || date.is_empty() {
            continue;
        }

        // Absent or unparsable counts are zero
        let read_count = |idx: Option<usize>| -> u64 {
            idx.and_then(|i| record.get(i))
                .map(|v| v.trim().parse().unwrap_or(0))
                .unwrap_or(0)
        };

        let day = DailyMetrics {
            positive: read_count(positive_idx),
            death: read_count(death_idx),
            total_test_results: read_count(tests_idx),
        };

        dates.insert(date.clone());
        metrics.entry(state).or_default().insert(date, day);
    }

    Ok((metrics, dates.into_iter().collect()))
}

fn load_geojson_and_join(
    config: &AppConfig,
    metrics: &MetricsByState,
) -> Result<Vec<StateFeature>> {
    use geojson::GeoJson;
    use std::convert::TryInto; // For TryInto<geo::Geometry>

    println!("Loading GeoJSON from {:?}...", config.input.geojson);
    let file = File::open(&config.input.geojson)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", config.input.geojson))?;
    let reader = BufReader::new(file);

    // Parse the GeoJSON. warning: this loads the whole file into memory.
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut states = Vec::new();

    for feature in collection.features {
        let props = match feature.properties.as_ref() {
            Some(p) => p,
            None => continue,
        };

        // 1. Join key
        let abbr = match props.get(&config.input.join_property) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => continue, // Skip if no key or not string/number
        };

        // 2. Display name and population
        let name = match props.get(&config.input.name_property) {
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => abbr.clone(),
        };
        // Some exports store population as a float; accept either shape.
        let population = props
            .get(&config.input.population_property)
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
            .unwrap_or(0);

        // 3. Optional precomputed centroid [lon, lat]
        let centroid = config
            .input
            .centroid_property
            .as_ref()
            .and_then(|key| props.get(key))
            .and_then(parse_centroid);

        // 4. Geometry
        let geometry = match feature.geometry {
            Some(geo) => {
                let valid_geo: geo::Geometry<f64> = geo
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            }
            None => continue,
        };

        // Unlike a strict join, states with no metric rows are kept with an
        // empty daily map so every lookup on them reads zero.
        let daily = metrics.get(&abbr).cloned().unwrap_or_default();

        states.push(StateFeature {
            abbr,
            name,
            population,
            geometry,
            centroid,
            daily,
        });
    }

    Ok(states)
}

fn parse_centroid(value: &serde_json::Value) -> Option<Point<f64>> {
    let coords = value.as_array()?;
    if coords.len() != 2 {
        return None;
    }
    let lon = coords[0].as_f64()?;
    let lat = coords[1].as_f64()?;
    Some(Point::new(lon, lat))
}
