//! Deterministic series colours: one palette per coalition index.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    Reds = 0,
    Blues = 1,
    Greens = 2,
    Neutrals = 3,
}

const REDS: &[&str] = &[
    "128,0,0", "128,128,0", "139,0,0", "139,69,19", "160,82,45", "165,42,42", "178,34,34",
    "184,134,11", "188,143,143", "189,183,107", "199,21,133", "205,133,63", "205,92,92",
    "210,105,30", "210,180,140", "218,112,214", "218,165,32", "219,112,147", "220,20,60",
    "222,184,135", "233,150,122", "238,232,170", "240,128,128", "240,230,140", "244,164,96",
    "245,222,179", "245,245,220", "250,128,114", "250,235,215", "250,240,230", "250,250,210",
    "253,245,230", "255,0,0", "255,105,180", "255,127,80", "255,140,0", "255,160,122",
    "255,165,0", "255,182,193", "255,192,203", "255,20,147", "255,215,0", "255,218,185",
    "255,222,173", "255,228,181", "255,228,196", "255,228,225", "255,235,205", "255,239,213",
    "255,250,205", "255,255,0", "255,69,0", "255,99,71",
];

const BLUES: &[&str] = &[
    "0,0,128", "0,0,139", "0,0,205", "0,0,255", "0,128,128", "0,139,139", "0,191,255",
    "0,206,209", "0,255,255", "0,255,255", "100,149,237", "106,90,205", "112,128,144",
    "119,136,153", "123,104,238", "135,206,235", "135,206,250", "138,43,226", "147,112,219",
    "148,0,211", "153,50,204", "173,216,230", "175,238,238", "176,196,222", "176,224,230",
    "186,85,211", "230,230,250", "25,25,112", "30,144,255", "47,79,79", "65,105,225",
    "70,130,180", "72,61,139", "75,0,130", "95,158,160",
];

const GREENS: &[&str] = &[
    "0,100,0", "0,128,0", "0,250,154", "0,255,0", "0,255,127", "102,205,170", "107,142,35",
    "124,252,0", "127,255,0", "127,255,212", "143,188,143", "144,238,144", "152,251,152",
    "154,205,50", "173,255,47", "32,178,170", "34,139,34", "46,139,87", "50,205,50",
    "60,179,113", "64,224,208", "72,209,204", "85,107,47",
];

const NEUTRALS: &[&str] = &[
    "0,0,0", "105,105,105", "128,0,128", "128,128,128", "139,0,139", "169,169,169",
    "192,192,192", "211,211,211", "216,191,216", "220,220,220", "221,160,221", "238,130,238",
    "245,245,245", "255,0,255", "255,0,255", "255,255,255",
];

const PRIMARY: [&str; 4] = ["255,0,0", "0,0,255", "0,255,0", "128,128,128"];

impl Palette {
    pub fn for_coalition(index: usize) -> Self {
        match index % 4 {
            0 => Palette::Reds,
            1 => Palette::Blues,
            2 => Palette::Greens,
            _ => Palette::Neutrals,
        }
    }

    fn stops(self) -> &'static [&'static str] {
        match self {
            Palette::Reds => REDS,
            Palette::Blues => BLUES,
            Palette::Greens => GREENS,
            Palette::Neutrals => NEUTRALS,
        }
    }
}

/// The single designated colour of a coalition.
pub fn primary(coalition_index: usize) -> String {
    format!("rgb({})", PRIMARY[coalition_index % PRIMARY.len()])
}

fn parse_rgb(stop: &str) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (slot, part) in out.iter_mut().zip(stop.split(',')) {
        *slot = part.trim().parse().unwrap_or(0.0);
    }
    out
}

fn basis(t1: f64, v0: f64, v1: f64, v2: f64, v3: f64) -> f64 {
    let t2 = t1 * t1;
    let t3 = t2 * t1;
    ((1.0 - 3.0 * t1 + 3.0 * t2 - t3) * v0
        + (4.0 - 6.0 * t2 + 3.0 * t3) * v1
        + (1.0 + 3.0 * t1 + 3.0 * t2 - 3.0 * t3) * v2
        + t3 * v3)
        / 6.0
}

/// Closed uniform B-spline through the stops, evaluated at `t` in `[0, 1)`.
fn spline_closed(values: &[f64], t: f64) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let mut t = t % 1.0;
    if t < 0.0 {
        t += 1.0;
    }
    let i = ((t * n as f64).floor() as usize).min(n - 1);
    let v0 = values[(i + n - 1) % n];
    let v1 = values[i % n];
    let v2 = values[(i + 1) % n];
    let v3 = values[(i + 2) % n];
    basis((t - i as f64 / n as f64) * n as f64, v0, v1, v2, v3)
}

fn clamp_channel(v: f64) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}

/// `n` colours sampled evenly over `[0, n)` from a palette.
pub fn generate_colors(n: usize, palette: Palette) -> Vec<String> {
    let stops: Vec<[f64; 3]> = palette.stops().iter().map(|s| parse_rgb(s)).collect();
    let channels: [Vec<f64>; 3] = [0, 1, 2].map(|c| stops.iter().map(|rgb| rgb[c]).collect());
    (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            let [r, g, b] = [0, 1, 2].map(|c| clamp_channel(spline_closed(&channels[c], t)));
            format!("rgb({}, {}, {})", r, g, b)
        })
        .collect()
}

/// Colours for `count` series of one coalition; a lone series gets the primary colour.
pub fn series_colors(coalition_index: usize, count: usize) -> Vec<String> {
    if count > 1 {
        generate_colors(count, Palette::for_coalition(coalition_index))
    } else {
        vec![primary(coalition_index)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_colors_per_coalition() {
        assert_eq!(primary(0), "rgb(255,0,0)");
        assert_eq!(primary(1), "rgb(0,0,255)");
        assert_eq!(series_colors(1, 1), vec!["rgb(0,0,255)".to_string()]);
    }

    #[test]
    fn generated_colors_are_deterministic() {
        let a = generate_colors(5, Palette::Blues);
        let b = generate_colors(5, Palette::Blues);
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert!(a.iter().all(|c| c.starts_with("rgb(") && c.ends_with(')')));
    }

    #[test]
    fn spline_of_constant_is_constant() {
        let values = [40.0; 6];
        for t in [0.0, 0.2, 0.5, 0.99] {
            assert!((spline_closed(&values, t) - 40.0).abs() < 1e-9);
        }
    }

    #[test]
    fn first_sample_blends_neighbours() {
        // t = 0 weights stops (n-1, 0, 1) as 1:4:1
        let values = [0.0, 60.0, 0.0, 0.0, 120.0];
        let expected = (120.0 + 4.0 * 0.0 + 60.0) / 6.0;
        assert!((spline_closed(&values, 0.0) - expected).abs() < 1e-9);
    }
}
