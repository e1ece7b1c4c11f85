//! Cobertura XML Coverage Report Formatter
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <coverage line-rate="0.5" branch-rate="0" lines-covered="2" lines-valid="4" version="1.0">
//!   <packages>
//!     <package name="lib" line-rate="0.5" branch-rate="0" complexity="0">
//!       <classes>
//!         <class name="calc" filename="lib/calc.lua" line-rate="0.5" branch-rate="0" complexity="0">
//!           <methods>...</methods>
//!           <lines>
//!             <line number="3" hits="0" executed="true" covered="false"/>
//!           </lines>
//!         </class>
//!       </classes>
//!     </package>
//!   </packages>
//! </coverage>
//! ```
//!
//! `line-rate` counts covered lines. The extra `executed` and `covered`
//! attributes keep the two states apart for tools that read them.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use crate::coverage::{CoverageData, FileCoverage};
use crate::result::CoverageResult;

/// Files grouped by directory
type PackageMap<'a> = BTreeMap<String, Vec<(&'a str, &'a FileCoverage)>>;

/// Cobertura XML format report generator
#[derive(Debug)]
pub struct CoberturaFormatter<'a> {
    data: &'a CoverageData,
    version: String,
}

fn rate(covered: usize, total: usize) -> f64 {
    if total > 0 {
        covered as f64 / total as f64
    } else {
        0.0
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl<'a> CoberturaFormatter<'a> {
    /// Create a new Cobertura formatter
    #[must_use]
    pub fn new(data: &'a CoverageData) -> Self {
        Self {
            data,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Set the version string
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Generate Cobertura XML report as a string
    #[must_use]
    pub fn generate(&self) -> String {
        let summary = self.data.summary.clone().unwrap_or_default();
        let packages = self.group_by_package();

        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(
            r#"<!DOCTYPE coverage SYSTEM "http://cobertura.sourceforge.net/xml/coverage-04.dtd">"#,
        );
        xml.push('\n');
        let _ = writeln!(
            xml,
            r#"<coverage line-rate="{:.4}" branch-rate="0" lines-covered="{}" lines-valid="{}" version="{}">"#,
            rate(summary.covered_lines, summary.total_lines),
            summary.covered_lines,
            summary.total_lines,
            escape(&self.version),
        );
        xml.push_str("  <packages>\n");

        for (package_name, files) in &packages {
            let covered: usize = files.iter().map(|(_, f)| f.covered_lines).sum();
            let total: usize = files.iter().map(|(_, f)| f.total_lines).sum();
            let _ = writeln!(
                xml,
                r#"    <package name="{}" line-rate="{:.4}" branch-rate="0" complexity="0">"#,
                escape(package_name),
                rate(covered, total)
            );
            xml.push_str("      <classes>\n");

            for (path, file) in files {
                let _ = writeln!(
                    xml,
                    r#"        <class name="{}" filename="{}" line-rate="{:.4}" branch-rate="0" complexity="0">"#,
                    escape(&Self::class_name(path)),
                    escape(path),
                    rate(file.covered_lines, file.total_lines)
                );
                Self::write_methods(&mut xml, file);
                xml.push_str("          <lines>\n");
                for (line, state) in &file.lines {
                    let hits = if state.covered { state.hits.max(1) } else { 0 };
                    let _ = writeln!(
                        xml,
                        r#"            <line number="{line}" hits="{hits}" executed="{}" covered="{}"/>"#,
                        state.executed, state.covered
                    );
                }
                xml.push_str("          </lines>\n");
                xml.push_str("        </class>\n");
            }

            xml.push_str("      </classes>\n");
            xml.push_str("    </package>\n");
        }

        xml.push_str("  </packages>\n");
        xml.push_str("</coverage>\n");
        xml
    }

    fn write_methods(xml: &mut String, file: &FileCoverage) {
        xml.push_str("          <methods>\n");
        for func in file.functions.values() {
            let _ = writeln!(
                xml,
                r#"            <method name="{}" signature="" line-rate="{}" hits="{}"/>"#,
                escape(&func.name),
                if func.calls > 0 { "1" } else { "0" },
                func.calls
            );
        }
        xml.push_str("          </methods>\n");
    }

    /// Save the Cobertura report to a file
    ///
    /// # Errors
    ///
    /// Returns error if file write fails
    pub fn save(&self, path: &Path) -> CoverageResult<()> {
        std::fs::write(path, self.generate())?;
        Ok(())
    }

    fn group_by_package(&self) -> PackageMap<'a> {
        let mut packages: PackageMap<'a> = BTreeMap::new();
        if let Some(files) = &self.data.files {
            for (path, file) in files {
                let package = path
                    .rsplit_once('/')
                    .map_or_else(|| "default".to_string(), |(dir, _)| dir.to_string());
                packages.entry(package).or_default().push((path.as_str(), file));
            }
        }
        packages
    }

    fn class_name(path: &str) -> String {
        path.rsplit_once('/')
            .map_or(path, |(_, name)| name)
            .trim_end_matches(".lua")
            .to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::formatters::fixtures::sample_data;

    #[test]
    fn test_generate_header_and_totals() {
        let data = sample_data();
        let xml = CoberturaFormatter::new(&data).with_version("9.9").generate();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"line-rate="0.5000""#));
        assert!(xml.contains(r#"lines-covered="2" lines-valid="4" version="9.9""#));
        assert!(xml.trim_end().ends_with("</coverage>"));
    }

    #[test]
    fn test_package_and_class_names() {
        let data = sample_data();
        let xml = CoberturaFormatter::new(&data).generate();
        assert!(xml.contains(r#"<package name="lib""#));
        assert!(xml.contains(r#"<class name="calc" filename="lib/calc.lua""#));
        assert!(xml.contains(r#"<method name="add" signature="" line-rate="1" hits="2"/>"#));
    }

    #[test]
    fn test_line_states_are_distinguished() {
        let data = sample_data();
        let xml = CoberturaFormatter::new(&data).generate();
        assert!(xml.contains(r#"<line number="2" hits="2" executed="true" covered="true"/>"#));
        assert!(xml.contains(r#"<line number="3" hits="0" executed="true" covered="false"/>"#));
        assert!(xml.contains(r#"<line number="4" hits="0" executed="false" covered="false"/>"#));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"a<b>&"c""#), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn test_save_creates_file() {
        let data = sample_data();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cobertura.xml");
        CoberturaFormatter::new(&data).save(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("<packages>"));
    }
}
