use crate::error::DeployError;
use crate::models::{Boilerplate, Runtime};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

// Pick the docker-compose template for a (runtime, boilerplate) pair.
// WordPress ships its own code in the container image and gets a dedicated
// template; everything else uses the runtime default.
pub fn select_compose_template(runtime: Runtime, boilerplate: Boilerplate) -> &'static str {
    if runtime == Runtime::Php && boilerplate == Boilerplate::Wordpress {
        return "docker-compose.wordpress.tpl";
    }

    match runtime {
        Runtime::Php => "docker-compose.php.tpl",
        Runtime::Python => "docker-compose.python.tpl",
        Runtime::Node => "docker-compose.node.tpl",
    }
}

#[derive(Debug, Clone)]
pub struct ComposeContext<'a> {
    pub domain: &'a str,
    pub data_dir: &'a Path,
    pub docker_image: &'a str,
    pub upstream_port: u16,
    pub container_port: u16,
}

// Literal placeholder substitution, no escaping beyond exact match.
fn substitute(template: &str, ctx: &ComposeContext<'_>) -> String {
    template
        .replace("{{DOMAIN}}", ctx.domain)
        .replace("{{SITE_DIR}}", &ctx.data_dir.to_string_lossy())
        .replace("{{DOCKER_IMAGE}}", ctx.docker_image)
        .replace("{{UPSTREAM_PORT}}", &ctx.upstream_port.to_string())
        .replace("{{CONTAINER_PORT}}", &ctx.container_port.to_string())
}

// Render the compose manifest for a site and write it with owner-only
// permissions; it carries host mount paths that should not be world-readable.
pub async fn render_compose_file(
    templates_dir: &Path,
    template_name: &str,
    ctx: &ComposeContext<'_>,
    compose_file: &Path,
) -> Result<(), DeployError> {
    let template_path = templates_dir.join(template_name);
    if !template_path.exists() {
        return Err(DeployError::TemplateNotFound(template_path));
    }

    let template = fs::read_to_string(&template_path).await?;
    let rendered = substitute(&template, ctx);
    fs::write(compose_file, rendered).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(compose_file, std::fs::Permissions::from_mode(0o600)).await?;
    }

    info!(
        "Generated compose file for {} using template {} on port {} (container {}) using image {}",
        ctx.domain, template_name, ctx.upstream_port, ctx.container_port, ctx.docker_image
    );
    Ok(())
}
