use std::path::Path;

pub fn run(root: &Path, port: u16) -> anyhow::Result<()> {
    canary_core::config::Config::load(root)?;

    let rt = tokio::runtime::Runtime::new()?;
    let root_buf = root.to_path_buf();

    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let actual_port = listener.local_addr()?.port();
        println!("canary API for {} → http://localhost:{actual_port}", root_buf.display());

        tokio::select! {
            res = canary_server::serve_on(root_buf, listener) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })
}
