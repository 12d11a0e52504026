//! Renders the daemon configuration from a template directory.

use camino::{Utf8Path, Utf8PathBuf};
use minijinja::{Environment, ErrorKind, path_loader};
use thiserror::Error;
use tracing::debug;

use crate::assembler::RenderContext;

const RENDER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::render");

/// Errors raised while rendering a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template does not exist in the template directory.
    #[error("the template file {name} was not found in {dir}")]
    NotFound {
        /// Template name.
        name: String,
        /// Directory searched.
        dir: Utf8PathBuf,
    },
    /// The template could not be loaded, parsed or rendered.
    #[error("unable to render template {name}: {source}")]
    Render {
        /// Template name.
        name: String,
        /// Template engine error.
        #[source]
        source: minijinja::Error,
    },
}

/// Template environment rooted at a directory.
///
/// Block tags are stripped together with their line so templates can be
/// laid out readably, and a template's trailing newline is preserved.
#[derive(Debug)]
pub struct ConfigRenderer {
    dir: Utf8PathBuf,
    env: Environment<'static>,
}

impl ConfigRenderer {
    /// Creates a renderer loading templates from `dir`.
    #[must_use]
    pub fn new(dir: &Utf8Path) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(dir.as_std_path().to_path_buf()));
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        Self {
            dir: dir.to_owned(),
            env,
        }
    }

    /// Renders template `name` with `context`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::NotFound`] when the template is missing and
    /// [`TemplateError::Render`] for any other template failure.
    pub fn render(&self, name: &str, context: &RenderContext) -> Result<String, TemplateError> {
        let template = self.env.get_template(name).map_err(|source| {
            if source.kind() == ErrorKind::TemplateNotFound {
                TemplateError::NotFound {
                    name: name.to_owned(),
                    dir: self.dir.clone(),
                }
            } else {
                TemplateError::Render {
                    name: name.to_owned(),
                    source,
                }
            }
        })?;
        let rendered = template
            .render(context)
            .map_err(|source| TemplateError::Render {
                name: name.to_owned(),
                source,
            })?;
        debug!(target: RENDER_TARGET, template = name, bytes = rendered.len(), "template rendered");
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;
    use crate::assembler::{CheckRequest, ConfigAssembler, InstanceRequest};
    use crate::network::HostInterfaces;

    /// The template shipped with the container image.
    const SHIPPED_TEMPLATES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");

    fn context(check: CheckRequest) -> RenderContext {
        let interfaces = HostInterfaces::from_names(["eth0", "eth1"]);
        let request = InstanceRequest {
            router_name: String::from("lb-1"),
            master: true,
            auth_pass: Some(String::from("s3cret")),
            vrid: Some(51),
            priority: 150,
            track_iface: String::from("eth0"),
            include: vec![String::from("203.0.113.0/24/eth0")],
            exclude: vec![String::from("198.51.100.9/32/eth1")],
            check,
        };
        ConfigAssembler::new(
            &interfaces,
            Utf8Path::new("/ka-data/scripts"),
            Utf8Path::new("/usr/local/bin/kentry-probe"),
        )
        .assemble(&request)
        .expect("valid request")
        .context
    }

    #[fixture]
    fn template_dir() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        (dir, path)
    }

    #[test]
    fn shipped_template_renders_the_instance() {
        let renderer = ConfigRenderer::new(Utf8Path::new(SHIPPED_TEMPLATES));
        let rendered = renderer
            .render("keepalived.conf", &context(CheckRequest::default()))
            .expect("render");
        assert!(rendered.contains("vrrp_instance lb-1 {"));
        assert!(rendered.contains("    state MASTER\n"));
        assert!(rendered.contains("    interface eth0\n"));
        assert!(rendered.contains("    virtual_router_id 51\n"));
        assert!(rendered.contains("    priority 150\n"));
        assert!(rendered.contains("        auth_pass s3cret\n"));
        assert!(rendered.contains("        203.0.113.0/24 dev eth0\n"));
        assert!(rendered.contains("virtual_ipaddress_excluded {\n        198.51.100.9/32 dev eth1\n"));
        assert!(!rendered.contains("vrrp_script"));
        assert!(rendered.ends_with("}\n"));
    }

    #[test]
    fn shipped_template_wires_the_builtin_probe() {
        let renderer = ConfigRenderer::new(Utf8Path::new(SHIPPED_TEMPLATES));
        let check = CheckRequest {
            probe_url: Some(String::from("haproxy:8080/health")),
            interval: 5,
            ..CheckRequest::default()
        };
        let rendered = renderer.render("keepalived.conf", &context(check)).expect("render");
        assert!(rendered.contains(
            "    script \"/usr/local/bin/kentry-probe http://haproxy:8080/health\"\n"
        ));
        assert!(rendered.contains("    interval 5\n"));
        assert!(rendered.contains("    track_script {\n        chk_service\n    }\n"));
    }

    #[test]
    fn shipped_template_wires_an_override_script() {
        let renderer = ConfigRenderer::new(Utf8Path::new(SHIPPED_TEMPLATES));
        let check = CheckRequest {
            override_script: Some(String::from("check.sh")),
            ..CheckRequest::default()
        };
        let rendered = renderer.render("keepalived.conf", &context(check)).expect("render");
        assert!(rendered.contains("    script \"/ka-data/scripts/check.sh\"\n"));
    }

    #[rstest]
    fn block_lines_are_stripped(template_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, dir) = template_dir;
        fs::write(
            dir.join("t.conf"),
            "start\n    {% if is_master %}\nmaster\n    {% endif %}\nend\n",
        )
        .expect("write template");
        let rendered = ConfigRenderer::new(&dir)
            .render("t.conf", &context(CheckRequest::default()))
            .expect("render");
        assert_eq!(rendered, "start\nmaster\nend\n");
    }

    #[rstest]
    fn missing_template_is_not_found(template_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, dir) = template_dir;
        let error = ConfigRenderer::new(&dir)
            .render("keepalived.conf", &context(CheckRequest::default()))
            .expect_err("no template");
        assert!(matches!(error, TemplateError::NotFound { .. }));
        assert!(error.to_string().starts_with("the template file keepalived.conf was not found"));
    }

    #[rstest]
    fn broken_template_is_a_render_error(template_dir: (TempDir, Utf8PathBuf)) {
        let (_guard, dir) = template_dir;
        fs::write(dir.join("broken.conf"), "{% if %}\n").expect("write template");
        let error = ConfigRenderer::new(&dir)
            .render("broken.conf", &context(CheckRequest::default()))
            .expect_err("syntax error");
        assert!(matches!(error, TemplateError::Render { .. }));
    }
}
