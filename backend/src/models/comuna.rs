use serde::Serialize;

/// A Chilean municipality the platform delivers to.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Comuna {
    pub id: &'static str,
    pub name: &'static str,
    pub region: &'static str,
}

pub const COMUNAS: &[Comuna] = &[
    Comuna { id: "villarrica", name: "Villarrica", region: "Araucanía" },
    Comuna { id: "pucon", name: "Pucón", region: "Araucanía" },
    Comuna { id: "lican-ray", name: "Licán Ray", region: "Araucanía" },
    Comuna { id: "curarrehue", name: "Curarrehue", region: "Araucanía" },
    Comuna { id: "freire", name: "Freire", region: "Araucanía" },
];

pub fn find(id: &str) -> Option<&'static Comuna> {
    COMUNAS.iter().find(|c| c.id == id)
}

pub fn is_known(id: &str) -> bool {
    find(id).is_some()
}

/// Display name, falling back to the raw id for comunas no longer served.
pub fn display_name(id: &str) -> String {
    find(id).map(|c| c.name.to_string()).unwrap_or_else(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id() {
        assert_eq!(find("pucon").map(|c| c.name), Some("Pucón"));
        assert!(is_known("villarrica"));
        assert!(!is_known("santiago"));
    }

    #[test]
    fn display_name_falls_back_to_id() {
        assert_eq!(display_name("lican-ray"), "Licán Ray");
        assert_eq!(display_name("temuco"), "temuco");
    }
}
