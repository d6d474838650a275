//! Rendering of parameters as model source and injection into marked regions.
//!
//! A region is everything between a `// NAME START` line and the matching
//! `// NAME END` marker. Injection replaces it with the START marker, a
//! newline and the rendered body; the END marker stays in place.

use crate::analyzers::flow::HOURS;
use crate::error::ParametrizeError;
use crate::parametrize::rates::{DestinationTable, DurationTable};
use crate::parser::Station;

/// Replaces the body of region `name` in `text`.
pub fn replace_region(text: &str, name: &str, body: &str) -> Result<String, ParametrizeError> {
    let start_marker = format!("// {name} START");
    let end_marker = format!("// {name} END");
    let missing = || ParametrizeError::MissingMarker(name.to_string());

    let start = text.find(&start_marker).ok_or_else(missing)?;
    let end = text[start..]
        .find(&end_marker)
        .map(|offset| start + offset)
        .ok_or_else(missing)?;

    let mut out = String::with_capacity(text.len() + body.len());
    out.push_str(&text[..start]);
    out.push_str(&start_marker);
    out.push('\n');
    out.push_str(body);
    out.push_str(&text[end..]);
    Ok(out)
}

/// Formats a real literal; integral values keep a trailing `.0`.
pub fn fmt_real(value: f64) -> String {
    let s = value.to_string();
    if s.contains(['.', 'e', 'E', 'N', 'i']) {
        s
    } else {
        format!("{s}.0")
    }
}

/// Formats a probability with two significant digits, trailing zeros trimmed.
pub fn fmt_prob(p: f64) -> String {
    if p == 0.0 || !p.is_finite() {
        return fmt_real(p);
    }
    let exponent = p.abs().log10().floor() as i32;
    let decimals = (1 - exponent).max(0) as usize;
    let s = format!("{p:.decimals$}");
    let trimmed = if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s.as_str()
    };
    fmt_real(trimmed.parse().unwrap_or(p))
}

fn join<T>(items: impl IntoIterator<Item = T>, f: impl Fn(T) -> String) -> String {
    items.into_iter().map(f).collect::<Vec<_>>().join(", ")
}

pub fn render_walk_time(average_walk_time: f64) -> String {
    format!("const walk_time = {};\n", fmt_real(1.0 / average_walk_time))
}

/// Whether a user accepts an incentive, drawn with probability `cooperation`.
pub fn render_cooperation(cooperation: f64) -> String {
    if cooperation == 0.0 {
        "return false;\n".to_string()
    } else if cooperation == 1.0 {
        "return true;\n".to_string()
    } else {
        format!(
            "return (selectFrom(0:{}, 1:{}) == 0);\n",
            fmt_real(cooperation),
            fmt_real(1.0 - cooperation)
        )
    }
}

pub fn render_adjacency(constant: &str, lists: &[Vec<usize>]) -> String {
    let rows = join(lists, |neighbours| {
        if neighbours.is_empty() {
            "newList(int)".to_string()
        } else {
            format!("[:{}:]", join(neighbours, |j| j.to_string()))
        }
    });
    format!("const {constant} = [:{rows}:];\n")
}

/// A flat integer list, e.g. `const capacity = [:20, 10:];`.
pub fn render_int_list(prefix: &str, values: &[i32]) -> String {
    format!("{prefix}[:{}:];\n", join(values, |v| v.to_string()))
}

/// The all-zero return-intent matrix, one row per station.
pub fn render_return_matrix(stations: usize) -> String {
    let row = format!("[: {} :]", vec!["0"; stations].join(","));
    let rows = vec![row; stations].join(", ");
    format!("attrib will_return := [:{rows}:];\n")
}

pub fn render_durations(stations: &[Station], durations: &DurationTable) -> String {
    let rows: Vec<String> = stations
        .iter()
        .enumerate()
        .map(|(i, station)| {
            let cells = join(0..stations.len(), |j| fmt_real(durations.minutes(i, j)));
            format!("// {}\n[: {cells}:]", station.name)
        })
        .collect();
    format!("const dur = [:\n{}:];\n", rows.join(",\n"))
}

/// One `Station` and one `Spawner` per station, numbered by position.
pub fn render_stations(stations: &[Station], available: &[i32]) -> String {
    stations
        .iter()
        .zip(available)
        .enumerate()
        .map(|(i, (station, avail))| {
            format!(
                "new Station({i}, {}, {avail}); //{}\nnew Spawner({i});\n",
                station.capacity, station.name
            )
        })
        .collect()
}

/// One `dest_<h>` function per hour selecting a destination by probability.
pub fn render_destinations(stations: &[Station], table: &DestinationTable) -> String {
    let mut out = String::new();
    for hour in 0..HOURS {
        out.push_str(&format!("\nfun int dest_{hour}(int sid){{"));
        for (i, station) in stations.iter().enumerate() {
            let probabilities = table.probabilities(hour, i);
            if probabilities.is_empty() {
                continue;
            }
            let choices = join(probabilities, |(j, p)| format!("{j}:{}", fmt_prob(*p)));
            out.push_str(&format!(
                "if (sid == {i}) // {}\n    return selectFrom({choices});\nelse ",
                station.name
            ));
        }
        out.push_str("\n    return -1;}\n");
    }
    out
}

pub fn render_spawn_rates(stations: &[Station], rates: &[[f64; HOURS]]) -> String {
    let rows: Vec<String> = stations
        .iter()
        .zip(rates)
        .map(|(station, hourly)| {
            format!("// {}\n[:{}:]", station.name, join(hourly, |r| fmt_real(*r)))
        })
        .collect();
    format!("const demand = [:\n{}:];\n", rows.join(",\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "header\n// CAPACITIES START\nold\nlines\n// CAPACITIES END\nfooter\n";

    #[test]
    fn test_replace_region_keeps_markers() {
        let out = replace_region(MODEL, "CAPACITIES", "const capacity = [:1:];\n").unwrap();
        assert_eq!(
            out,
            "header\n// CAPACITIES START\nconst capacity = [:1:];\n// CAPACITIES END\nfooter\n"
        );
    }

    #[test]
    fn test_replace_region_is_idempotent() {
        let once = replace_region(MODEL, "CAPACITIES", "x;\n").unwrap();
        let twice = replace_region(&once, "CAPACITIES", "x;\n").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_replace_region_missing_marker() {
        assert_eq!(
            replace_region(MODEL, "DUR", "x"),
            Err(ParametrizeError::MissingMarker("DUR".to_string()))
        );
        let reversed = "// AVAIL END\n// AVAIL START\n";
        assert!(replace_region(reversed, "AVAIL", "x").is_err());
    }

    #[test]
    fn test_adjacency_marker_does_not_match_adjacency2() {
        let text = "// ADJACENCY2 START\n// ADJACENCY2 END\n// ADJACENCY START\n// ADJACENCY END\n";
        let out = replace_region(text, "ADJACENCY", "a;\n").unwrap();
        assert!(out.starts_with("// ADJACENCY2 START\n// ADJACENCY2 END\n// ADJACENCY START\na;\n"));
    }

    #[test]
    fn test_fmt_real() {
        assert_eq!(fmt_real(0.2), "0.2");
        assert_eq!(fmt_real(1.0), "1.0");
        assert_eq!(fmt_real(0.0), "0.0");
        assert_eq!(fmt_real(17.5), "17.5");
    }

    #[test]
    fn test_fmt_prob() {
        assert_eq!(fmt_prob(0.5), "0.5");
        assert_eq!(fmt_prob(1.0), "1.0");
        assert_eq!(fmt_prob(2.0 / 3.0), "0.67");
        assert_eq!(fmt_prob(1.0 / 3.0), "0.33");
        assert_eq!(fmt_prob(0.0125), "0.013");
        assert_eq!(fmt_prob(0.0996), "0.1");
    }

    #[test]
    fn test_render_cooperation() {
        assert_eq!(render_cooperation(0.0), "return false;\n");
        assert_eq!(render_cooperation(1.0), "return true;\n");
        assert_eq!(
            render_cooperation(0.25),
            "return (selectFrom(0:0.25, 1:0.75) == 0);\n"
        );
    }

    #[test]
    fn test_render_adjacency() {
        assert_eq!(
            render_adjacency("zone_adjacency", &[vec![1], vec![0, 2], vec![]]),
            "const zone_adjacency = [:[:1:], [:0, 2:], newList(int):];\n"
        );
    }

    #[test]
    fn test_render_int_list_and_return() {
        assert_eq!(
            render_int_list("const capacity = ", &[20, 10]),
            "const capacity = [:20, 10:];\n"
        );
        assert_eq!(
            render_return_matrix(2),
            "attrib will_return := [:[: 0,0 :], [: 0,0 :]:];\n"
        );
    }

    #[test]
    fn test_render_stations() {
        let stations = vec![Station::new("A", 20, 9), Station::new("B", 10, 5)];
        assert_eq!(
            render_stations(&stations, &[9, 5]),
            "new Station(0, 20, 9); //A\nnew Spawner(0);\nnew Station(1, 10, 5); //B\nnew Spawner(1);\n"
        );
    }

    #[test]
    fn test_render_spawn_rates() {
        let stations = vec![Station::new("A", 20, 9)];
        let mut rates = [0.0; HOURS];
        rates[8] = 0.025;
        let out = render_spawn_rates(&stations, &[rates]);
        assert!(out.starts_with("const demand = [:\n// A\n[:0.0, 0.0,"));
        assert!(out.contains("0.025"));
        assert!(out.ends_with("0.0:]:];\n"));
    }
}
