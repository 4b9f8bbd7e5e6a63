//! Minimal robots.txt support: the `*` group's Allow/Disallow prefixes and
//! Crawl-delay.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Robots {
    pub allows: Vec<String>,
    pub disallows: Vec<String>,
    pub crawl_delay_ms: Option<u64>,
}

impl Robots {
    pub fn parse(txt: &str) -> Self {
        let mut active = false;
        let mut robots = Robots::default();
        for line in txt.lines() {
            let l = line.trim();
            if l.is_empty() || l.starts_with('#') {
                continue;
            }
            let Some((k, v)) = l.split_once(':') else { continue };
            let val = v.trim();
            match k.trim().to_lowercase().as_str() {
                "user-agent" => active = val == "*",
                "allow" if active && !val.is_empty() => robots.allows.push(val.to_string()),
                "disallow" if active && !val.is_empty() => robots.disallows.push(val.to_string()),
                "crawl-delay" if active => {
                    if let Ok(n) = val.parse::<f64>() {
                        robots.crawl_delay_ms = Some((n * 1000.0) as u64);
                    }
                }
                _ => {}
            }
        }
        robots
    }

    /// Longest matching prefix wins; Allow wins ties.
    pub fn allows_path(&self, path: &str) -> bool {
        let longest = |rules: &[String]| {
            rules
                .iter()
                .filter(|r| path.starts_with(r.as_str()))
                .map(String::len)
                .max()
        };
        match (longest(&self.allows), longest(&self.disallows)) {
            (Some(a), Some(d)) => a >= d,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }
}
