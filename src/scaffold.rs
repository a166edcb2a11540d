use crate::error::DeployError;
use crate::models::{friendly_version_label, Boilerplate, Runtime, Site};
use std::path::Path;
use tokio::fs;
use tracing::info;

// Write runtime-idiomatic starter code into the site's data directory.
// Existing files with the same names are overwritten, so migrations always
// refresh the boilerplate to the current generator's output. WordPress is
// the exception: its code ships inside the container image.
pub async fn create_boilerplate(site: &Site, data_dir: &Path) -> Result<(), DeployError> {
    if site.runtime == Runtime::Php && site.boilerplate == Boilerplate::Wordpress {
        info!("Skipping scaffold for {}: wordpress image ships its own code", site.domain);
        return Ok(());
    }

    match site.runtime {
        Runtime::Node => create_node_boilerplate(site, data_dir).await?,
        Runtime::Python => create_python_boilerplate(site, data_dir).await?,
        Runtime::Php => create_php_boilerplate(site, data_dir).await?,
    }

    info!("Created {:?} boilerplate for {} runtime", site.boilerplate, site.runtime);
    Ok(())
}

async fn create_node_boilerplate(site: &Site, data_dir: &Path) -> Result<(), DeployError> {
    let package_json = serde_json::json!({
        "name": site.domain.replace('.', "-"),
        "version": "1.0.0",
        "description": format!("Auto-generated Node.js app for {}", site.domain),
        "main": "server.js",
        "scripts": {
            "start": "node server.js"
        },
        "dependencies": {
            "express": "^4.18.0"
        }
    });
    let package_json = serde_json::to_string_pretty(&package_json)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(data_dir.join("package.json"), package_json).await?;

    let server_js = format!(
        r#"const express = require('express');
const path = require('path');
const app = express();
const port = process.env.PORT || 3000;

app.use(express.json());
app.use(express.static(__dirname));

app.get('/', (req, res) => {{
  res.sendFile(path.join(__dirname, 'index.html'));
}});

app.get('/api/status', (req, res) => {{
  res.json({{
    status: 'ok',
    domain: '{domain}',
    runtime: '{runtime}',
    uptime: process.uptime().toFixed(2),
    timestamp: new Date().toISOString()
  }});
}});

app.get('/health', (req, res) => {{
  res.json({{ status: 'healthy' }});
}});

app.use((req, res) => {{
  res.status(404).json({{ error: 'Not found' }});
}});

app.listen(port, '0.0.0.0', () => {{
  console.log(`Server running on port ${{port}}`);
}});
"#,
        domain = site.domain,
        runtime = friendly_version_label(&site.version),
    );
    fs::write(data_dir.join("server.js"), server_js).await?;

    fs::write(data_dir.join("index.html"), landing_page(&site.domain, "Node.js")).await?;
    Ok(())
}

async fn create_python_boilerplate(site: &Site, data_dir: &Path) -> Result<(), DeployError> {
    let app_py = format!(
        r#"from flask import Flask
import time

app = Flask(__name__)
start_time = time.time()


@app.route('/')
def home():
    return """{page}"""


@app.route('/api/status')
def status():
    return {{
        'status': 'ok',
        'domain': '{domain}',
        'runtime': '{runtime}',
        'uptime': int(time.time() - start_time),
    }}


@app.route('/health')
def health():
    return {{'status': 'healthy'}}


if __name__ == '__main__':
    import os
    port = int(os.environ.get('PORT', 3000))
    app.run(host='0.0.0.0', port=port, debug=False)
"#,
        page = landing_page(&site.domain, "Python/Flask"),
        domain = site.domain,
        runtime = friendly_version_label(&site.version),
    );
    fs::write(data_dir.join("app.py"), app_py).await?;
    fs::write(data_dir.join("requirements.txt"), "Flask==2.3.0\n").await?;
    Ok(())
}

async fn create_php_boilerplate(site: &Site, data_dir: &Path) -> Result<(), DeployError> {
    let index_php = format!(
        "<?php\nheader('Content-Type: text/html');\n?>\n{}",
        landing_page(&site.domain, "PHP"),
    );
    fs::write(data_dir.join("index.php"), index_php).await?;
    Ok(())
}

fn landing_page(domain: &str, runtime_name: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{domain}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
            margin: 0;
        }}
        .container {{
            background: white;
            border-radius: 15px;
            box-shadow: 0 20px 60px rgba(0,0,0,0.3);
            padding: 60px 40px;
            max-width: 600px;
            text-align: center;
        }}
        h1 {{ color: #333; }}
        p {{ color: #666; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>{domain}</h1>
        <p>Your {runtime_name} application is live!</p>
    </div>
</body>
</html>
"#
    )
}
