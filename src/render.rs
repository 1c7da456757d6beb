use crate::config::{AppConfig, MapConfig};
use crate::projection::ProjectedState;
use crate::scale::{self, RadiusScale};
use crate::types::{MapMode, Metric};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::fmt::Write as _;
use std::fs;

/// One rendered frame: a date, a metric and a display mode.
#[derive(Debug, Clone, Copy)]
pub struct MapView<'a> {
    pub date: &'a str,
    pub metric: Metric,
    pub mode: MapMode,
}

/// Largest raw test count across states on a date. Bubble radii and the
/// legend share this domain so frames within a day are comparable.
pub fn max_value(states: &[ProjectedState], date: &str) -> f64 {
    states
        .iter()
        .map(|s| s.value_on(date, Metric::TotalTestResults))
        .fold(0.0, f64::max)
}

pub fn render_map(states: &[ProjectedState], view: &MapView, map: &MapConfig) -> String {
    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = map.width,
        h = map.height,
    );

    svg.push_str("<g>");
    for state in states {
        if let Some(path) = state.path.as_deref() {
            let fill = match view.mode {
                MapMode::Bubbles => "white",
                MapMode::Choropleth => scale::choropleth_color(
                    view.metric,
                    state.value_per_million(view.date, view.metric),
                ),
            };
            let _ = write!(
                svg,
                r##"<path class="countries" d="{}" fill="{}" stroke="#ababab"><title>{}</title></path>"##,
                path,
                fill,
                escape_text(&state.state.name),
            );
        }
    }
    svg.push_str("</g>");

    if view.mode == MapMode::Bubbles {
        // Skipped entirely on days with no counts.
        if let Some(r) = RadiusScale::new(max_value(states, view.date)) {
            bubble_layer(&mut svg, states, view.date, Metric::TotalTestResults, &r);
            bubble_layer(&mut svg, states, view.date, Metric::Positive, &r);
            legend(&mut svg, &r);
        }
    }

    svg.push_str("</svg>");
    svg
}

fn bubble_layer(
    svg: &mut String,
    states: &[ProjectedState],
    date: &str,
    metric: Metric,
    r: &RadiusScale,
) {
    let color = scale::bubble_color(metric);
    let opacity = if metric == Metric::Positive { 0.8 } else { 0.2 };

    let _ = write!(svg, r#"<g class="bubbles {}">"#, metric.as_str());
    for state in states {
        // States without a projected anchor are not drawn.
        if let Some(anchor) = state.bubble_anchor {
            let radius = r.radius(state.value_on(date, metric));
            let _ = write!(
                svg,
                r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{color}" stroke="{color}" fill-opacity="{opacity}"/>"#,
                anchor.x(),
                anchor.y(),
                radius,
            );
        }
    }
    svg.push_str("</g>");
}

// Three reference bubbles sharing a baseline at y=145, each with a dashed
// rule at its top tangent and the rounded count beside the rule.
fn legend(svg: &mut String, r: &RadiusScale) {
    svg.push_str(r#"<g class="legend">"#);
    for value in scale::legend_values(r.max()) {
        let radius = r.radius(value as f64);
        let rule_y = 145.0 - 2.0 * radius;
        let _ = write!(
            svg,
            r##"<circle cx="52" cy="{:.2}" r="{:.2}" stroke="#ababab" fill="none"/>"##,
            145.0 - radius,
            radius,
        );
        let _ = write!(
            svg,
            r##"<line x1="52" y1="{y:.2}" x2="130" y2="{y:.2}" stroke="#ababab" stroke-dasharray="5 5"/>"##,
            y = rule_y,
        );
        let _ = write!(
            svg,
            r#"<text x="110" y="{:.2}">{}</text>"#,
            rule_y - 5.0,
            scale::format_count(value as f64),
        );
    }
    svg.push_str("</g>");
}

fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Write one SVG per date for each choropleth metric plus the bubble view:
/// `frames/{positive,death,totalTestResults,bubbles}/{date}.svg`.
pub fn generate_frames(
    config: &AppConfig,
    states: &[ProjectedState],
    dates: &[String],
) -> Result<()> {
    println!(
        "Rendering {} dates into {:?}...",
        dates.len(),
        config.output.frame_dir
    );

    for metric in Metric::ALL {
        let dir = config.output.frame_dir.join(metric.as_str());
        fs::create_dir_all(&dir).context("Failed to create frame directory")?;
    }
    let bubble_dir = config.output.frame_dir.join("bubbles");
    fs::create_dir_all(&bubble_dir).context("Failed to create frame directory")?;

    dates.par_iter().for_each(|date| {
        for metric in Metric::ALL {
            let view = MapView {
                date,
                metric,
                mode: MapMode::Choropleth,
            };
            let svg = render_map(states, &view, &config.map);
            let path = config
                .output
                .frame_dir
                .join(metric.as_str())
                .join(format!("{date}.svg"));
            if let Err(e) = fs::write(&path, svg) {
                eprintln!("Failed to save frame {:?}: {:?}", path, e);
            }
        }

        let view = MapView {
            date,
            metric: Metric::Positive,
            mode: MapMode::Bubbles,
        };
        let svg = render_map(states, &view, &config.map);
        let path = bubble_dir.join(format!("{date}.svg"));
        if let Err(e) = fs::write(&path, svg) {
            eprintln!("Failed to save frame {:?}: {:?}", path, e);
        }
    });

    println!(
        "Rendered {} frames.",
        dates.len() * (Metric::ALL.len() + 1)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputConfig, OutputConfig, ServerConfig};
    use crate::projection::project_states;
    use crate::types::{DailyMetrics, StateFeature};
    use geo::{Coord, LineString, MultiPolygon, Polygon};
    use std::collections::HashMap;

    const DATE: &str = "20200315";

    fn fixture_state(
        abbr: &str,
        name: &str,
        lon: f64,
        lat: f64,
        metrics: DailyMetrics,
    ) -> StateFeature {
        let ring: Vec<Coord<f64>> = [
            (lon - 2.0, lat - 2.0),
            (lon + 2.0, lat - 2.0),
            (lon + 2.0, lat + 2.0),
            (lon - 2.0, lat + 2.0),
            (lon - 2.0, lat - 2.0),
        ]
        .iter()
        .map(|&(x, y)| Coord { x, y })
        .collect();

        let mut daily = HashMap::new();
        daily.insert(DATE.to_string(), metrics);

        StateFeature {
            abbr: abbr.to_string(),
            name: name.to_string(),
            population: 1_000_000,
            geometry: MultiPolygon::new(vec![Polygon::new(LineString::new(ring), vec![])]),
            centroid: None,
            daily,
        }
    }

    fn fixture_states() -> Vec<ProjectedState> {
        let ks = fixture_state(
            "KS",
            "Kansas",
            -98.3,
            38.5,
            DailyMetrics {
                positive: 600,
                death: 10,
                total_test_results: 5000,
            },
        );
        let co = fixture_state(
            "CO",
            "Colorado",
            -105.5,
            39.0,
            DailyMetrics {
                positive: 40,
                death: 0,
                total_test_results: 300,
            },
        );
        project_states(vec![ks, co], &MapConfig::default())
    }

    #[test]
    fn choropleth_fills_come_from_the_metric_ramp() {
        let states = fixture_states();
        let view = MapView {
            date: DATE,
            metric: Metric::Positive,
            mode: MapMode::Choropleth,
        };
        let svg = render_map(&states, &view, &MapConfig::default());

        // Population is one million, so raw counts are per-million values:
        // 600 falls in the fifth band, 40 below the first threshold.
        assert!(svg.contains(r##"fill="#fd8d3c""##));
        assert!(svg.contains(r##"fill="#fff5eb""##));
        assert!(!svg.contains(r#"fill="white""#));
        assert!(!svg.contains("bubbles"));
        assert!(svg.contains("<title>Kansas</title>"));
    }

    #[test]
    fn dates_with_no_data_fall_to_the_lowest_band() {
        let states = fixture_states();
        let view = MapView {
            date: "20190101",
            metric: Metric::Positive,
            mode: MapMode::Choropleth,
        };
        let svg = render_map(&states, &view, &MapConfig::default());

        assert!(!svg.contains(r##"fill="#fd8d3c""##));
        assert_eq!(svg.matches(r##"fill="#fff5eb""##).count(), 2);
    }

    #[test]
    fn bubble_mode_draws_white_states_with_two_overlays() {
        let states = fixture_states();
        let view = MapView {
            date: DATE,
            metric: Metric::Positive,
            mode: MapMode::Bubbles,
        };
        let svg = render_map(&states, &view, &MapConfig::default());

        assert_eq!(svg.matches(r#"fill="white""#).count(), 2);
        assert!(svg.contains(r#"class="bubbles totalTestResults""#));
        assert!(svg.contains(r#"class="bubbles positive""#));
        assert!(svg.contains(r#"fill-opacity="0.2""#));
        assert!(svg.contains(r#"fill-opacity="0.8""#));
        // Two states in two overlays, plus three legend circles.
        assert_eq!(svg.matches("<circle").count(), 7);

        // Kansas holds the domain max, so its test bubble is full size and
        // the top legend entry is "5,000" with a 50px circle.
        assert!(svg.contains(r#"r="50.00""#));
        assert!(svg.contains(">5,000</text>"));
        assert!(svg.contains(">3,000</text>"));
        assert!(svg.contains(">500</text>"));
        assert!(svg.contains(r#"stroke-dasharray="5 5""#));
    }

    #[test]
    fn bubble_mode_without_counts_has_no_overlay_or_legend() {
        let states = fixture_states();
        let view = MapView {
            date: "20190101",
            metric: Metric::Positive,
            mode: MapMode::Bubbles,
        };
        let svg = render_map(&states, &view, &MapConfig::default());

        assert!(!svg.contains("<circle"));
        assert!(!svg.contains("legend"));
        assert_eq!(svg.matches(r#"fill="white""#).count(), 2);
    }

    #[test]
    fn mode_toggle_leaves_choropleth_colors_unchanged() {
        let states = fixture_states();
        let choropleth = MapView {
            date: DATE,
            metric: Metric::Positive,
            mode: MapMode::Choropleth,
        };
        let before = render_map(&states, &choropleth, &MapConfig::default());
        let bubbles = MapView {
            mode: MapMode::Bubbles,
            ..choropleth
        };
        render_map(&states, &bubbles, &MapConfig::default());
        let after = render_map(&states, &choropleth, &MapConfig::default());

        assert_eq!(before, after);
    }

    #[test]
    fn zero_counts_still_emit_a_bubble() {
        let a = fixture_state(
            "KS",
            "Kansas",
            -98.3,
            38.5,
            DailyMetrics {
                positive: 600,
                death: 10,
                total_test_results: 5000,
            },
        );
        let b = fixture_state(
            "CO",
            "Colorado",
            -105.5,
            39.0,
            DailyMetrics {
                positive: 0,
                death: 0,
                total_test_results: 300,
            },
        );
        let states = project_states(vec![a, b], &MapConfig::default());
        let view = MapView {
            date: DATE,
            metric: Metric::Positive,
            mode: MapMode::Bubbles,
        };
        let svg = render_map(&states, &view, &MapConfig::default());

        // Colorado reported no positives: its circle is kept at r=0 rather
        // than dropped, so both overlays stay aligned with the state list.
        assert!(svg.contains(r#"r="0.00""#));
        assert_eq!(svg.matches("<circle").count(), 7);
    }

    #[test]
    fn titles_escape_markup() {
        assert_eq!(escape_text("A & B <i>"), "A &amp; B &lt;i&gt;");
    }

    #[test]
    fn frames_land_in_per_view_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            input: InputConfig {
                geojson: dir.path().join("states.geojson"),
                metrics_csv: dir.path().join("daily.csv"),
                join_property: "STUSPS".to_string(),
                name_property: "NAME".to_string(),
                population_property: "population".to_string(),
                centroid_property: None,
            },
            map: MapConfig::default(),
            output: OutputConfig {
                frame_dir: dir.path().join("frames"),
            },
            server: ServerConfig { port: 0 },
        };
        let states = fixture_states();
        let dates = vec![DATE.to_string()];

        generate_frames(&config, &states, &dates).unwrap();

        for sub in ["positive", "death", "totalTestResults", "bubbles"] {
            let path = dir.path().join("frames").join(sub).join("20200315.svg");
            assert!(path.exists(), "missing {:?}", path);
        }
        let svg = std::fs::read_to_string(
            dir.path().join("frames").join("bubbles").join("20200315.svg"),
        )
        .unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
    }
}
