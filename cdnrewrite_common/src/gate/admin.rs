use percent_encoding::percent_decode_str;

/// Request paths under the administrative UI. Responses there are never rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminPaths {
    roots: Vec<String>,
}

impl AdminPaths {
    pub fn new<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            roots: roots
                .into_iter()
                .map(|root| normalize(root.as_ref()))
                .collect(),
        }
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Whether `path` is one of the admin roots or lies beneath one. Percent-escapes are decoded
    /// and case is ignored, matching how the CMS routes the request.
    pub fn is_admin_path(&self, path: &str) -> bool {
        let current = normalize(path);
        self.roots.iter().any(|root| current.starts_with(root.as_str()))
    }
}

impl Default for AdminPaths {
    fn default() -> Self {
        Self::new(["/admin/"])
    }
}

/// `admin`, `/Admin` and `/%61dmin` become `/admin/`; the bare root stays `/`.
fn normalize(path: &str) -> String {
    let decoded = percent_decode_str(path).decode_utf8_lossy().to_ascii_lowercase();
    let trimmed = decoded.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_are_normalized() {
        let admin = AdminPaths::new(["admin", "/cms/", "/dashboard"]);
        assert_eq!(admin.roots(), ["/admin/", "/cms/", "/dashboard/"]);
    }

    #[test]
    fn admin_paths_match() {
        let admin = AdminPaths::default();

        assert!(admin.is_admin_path("/admin"));
        assert!(admin.is_admin_path("/admin/"));
        assert!(admin.is_admin_path("/admin/pages/edit/1"));
        assert!(admin.is_admin_path("admin/pages"));
    }

    #[test]
    fn similar_paths_do_not_match() {
        let admin = AdminPaths::default();

        assert!(!admin.is_admin_path("/"));
        assert!(!admin.is_admin_path("/administrator"));
        assert!(!admin.is_admin_path("/about/admin"));
        assert!(!admin.is_admin_path("/assets/admin.css"));
    }

    #[test]
    fn escaped_and_mixed_case_paths_match() {
        let admin = AdminPaths::default();

        assert!(admin.is_admin_path("/%61dmin/pages"));
        assert!(admin.is_admin_path("/%41DMIN"));
        assert!(admin.is_admin_path("/Admin/pages"));
        assert!(admin.is_admin_path("%2Fadmin%2Fpages"));
        assert!(!admin.is_admin_path("/%61dministrator"));
    }

    #[test]
    fn roots_ignore_case() {
        let admin = AdminPaths::new(["/CMS"]);
        assert_eq!(admin.roots(), ["/cms/"]);
        assert!(admin.is_admin_path("/cms/edit"));
    }

    #[test]
    fn multiple_roots() {
        let admin = AdminPaths::new(["/admin/", "/dev/"]);

        assert!(admin.is_admin_path("/dev/build"));
        assert!(admin.is_admin_path("/admin"));
        assert!(!admin.is_admin_path("/developers"));
    }
}
