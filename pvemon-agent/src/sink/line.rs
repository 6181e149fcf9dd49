//! Dynatrace metric line protocol
//!
//! `proxmox.node.cpu.usage,cluster="lab",node="pve1" gauge,12.5 1718000000000`

use super::MetricObservation;

/// Format one observation. Labels without a value are omitted.
pub fn format_line(prefix: &str, obs: &MetricObservation) -> String {
    let mut line = String::with_capacity(128);
    if !prefix.is_empty() {
        line.push_str(prefix);
        line.push('.');
    }
    line.push_str(&obs.name);

    for (key, value) in obs.labels.iter() {
        if let Some(value) = value {
            line.push(',');
            line.push_str(key);
            line.push_str("=\"");
            escape_into(&mut line, value);
            line.push('"');
        }
    }

    line.push_str(" gauge,");
    line.push_str(&format_value(obs.value));
    line.push(' ');
    line.push_str(&obs.timestamp.timestamp_millis().to_string());
    line
}

fn escape_into(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
}

fn format_value(value: f64) -> String {
    // f64 Display already prints 3.0 as "3"
    format!("{}", value)
}

/// Split lines into batches whose newline-joined size stays under `max_bytes`.
/// A single line larger than the cap travels alone.
pub fn divide_into_batches(lines: Vec<String>, max_bytes: usize) -> Vec<Vec<String>> {
    let mut batches = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_bytes = 0usize;

    for line in lines {
        if !current.is_empty() && current_bytes + 1 + line.len() > max_bytes {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        if !current.is_empty() {
            current_bytes += 1; // "\n"
        }
        current_bytes += line.len();
        current.push(line);
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{label, LabelSet};
    use chrono::TimeZone;

    fn at(obs: MetricObservation) -> MetricObservation {
        MetricObservation {
            timestamp: chrono::Utc.timestamp_millis_opt(1_718_000_000_000).unwrap(),
            ..obs
        }
    }

    #[test]
    fn test_format_line() {
        let labels = LabelSet::root([
            label("cluster", "lab"),
            ("clusterid", None),
            label("node", "pve1"),
        ])
        .unwrap();
        let obs = at(MetricObservation::new("node.cpu.usage", 12.5, labels));

        assert_eq!(
            format_line("proxmox", &obs),
            "proxmox.node.cpu.usage,cluster=\"lab\",node=\"pve1\" gauge,12.5 1718000000000"
        );
    }

    #[test]
    fn test_format_escapes_and_integers() {
        let labels = LabelSet::root([label("service_name", "say \"hi\"\\now")]).unwrap();
        let obs = at(MetricObservation::new("node.service.state", 1.0, labels));

        assert_eq!(
            format_line("", &obs),
            "node.service.state,service_name=\"say \\\"hi\\\"\\\\now\" gauge,1 1718000000000"
        );
    }

    #[test]
    fn test_batches_respect_cap() {
        let lines: Vec<String> = (0..10).map(|_| "x".repeat(10)).collect();
        let batches = divide_into_batches(lines, 32);
        // 10 + 1 + 10 + 1 + 10 = 32
        assert_eq!(batches.len(), 4);
        assert_eq!(batches[0].len(), 3);
        for batch in &batches {
            assert!(batch.join("\n").len() <= 32);
        }
    }

    #[test]
    fn test_oversized_line_travels_alone() {
        let lines = vec!["a".repeat(5), "b".repeat(50), "c".repeat(5)];
        let batches = divide_into_batches(lines, 20);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1][0].len(), 50);
    }
}
