use crate::config::Settings;

/// Measures recorded for every experiment, before the per-station availabilities.
const MEASURES: &[&str] = &[
    "Retrievals",
    "IncRetrievals",
    "Returns",
    "IncReturns",
    "GlobalUsers",
    "Biking",
    "Waiting",
    "Returning",
    "AvgAvailable",
    "MinAvailable",
    "MaxAvailable",
    "StarvedStations",
    "FullStations",
    "DissatisfiedRet: level=0",
    "DissatisfiedRet: level=1",
    "DissatisfiedRet: level=2",
    "DissatisfiedRet: level=3",
    "DissatisfiedGet: level=0",
    "DissatisfiedGet: level=1",
    "DissatisfiedGet: level=2",
    "DissatisfiedGet: level=3",
];

const DEFAULT_NAME: &str = "test_exp";
const SCENARIO: &str = "TestScenario";

/// Renders the simulator's experiment file for `stations` stations.
pub fn render_experiment(settings: &Settings, stations: usize) -> String {
    let model = settings
        .model_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| settings.model_file.display().to_string());

    let mut out = String::from("\n");
    out.push_str(settings.name.as_deref().unwrap_or(DEFAULT_NAME));
    out.push('\n');
    out.push_str(&format!(
        "{model}\n{SCENARIO}\n{}\n{}\n{}\n",
        settings.replications, settings.simulation_end_time, settings.samples
    ));
    for measure in MEASURES {
        out.push_str(measure);
        out.push('\n');
    }
    for sid in 0..stations {
        out.push_str(&format!("Available: sid={sid}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_experiment() {
        let text = render_experiment(&Settings::default(), 3);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "");
        assert_eq!(&lines[1..7], ["test_exp", "model.carma", "TestScenario", "10", "1440", "1439"]);
        assert_eq!(lines[7], "Retrievals");
        assert_eq!(lines.len(), 7 + MEASURES.len() + 3);
        assert_eq!(lines.last(), Some(&"Available: sid=2"));
    }

    #[test]
    fn test_named_experiment() {
        let settings = Settings {
            name: Some("coop_50".to_string()),
            ..Settings::default()
        };
        assert!(render_experiment(&settings, 0).starts_with("\ncoop_50\nmodel.carma\n"));
    }
}
