//! Example: load a stylesheet and a script list, then fetch some JSON

use std::rc::Rc;

use anyhow::Context;
use masc::{Config, EventEmitter, LoadEvent, LoadListRequest, LoadRequest, Masc, NullHost};

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(document_url) => Config {
            document_url,
            ..Default::default()
        },
        None => Config::default(),
    };
    masc::init_logging(&config.log_filter)?;

    let host = Rc::new(NullHost::new(config.document_url.clone()));
    let masc = Masc::new(config, host).context("building loader")?;

    masc.loader().on(
        "loaderror",
        masc::listener(|_, event: &LoadEvent| {
            eprintln!("failed: {} ({:?})", event.url, event.error);
        }),
    );

    println!("Masc v{} initialized", masc::VERSION);

    smol::block_on(async {
        let _ = masc
            .loader()
            .load_stylesheet(LoadRequest::new("css/site.css"))
            .await;

        let failures = masc
            .loader()
            .load_script_list(
                LoadListRequest::new(["js/vendor.js", "js/app.js"])
                    .on_load(|| println!("script list finished")),
            )
            .await;
        println!("{} script(s) failed", failures.len());

        let prefetched = masc.loader().prefetch_assets().await;
        println!("{prefetched} asset(s) prefetched");

        let manifest_url = masc.resolver().resolve("data/manifest.json", None);
        match masc.fetcher().fetch_json(&manifest_url).await {
            Ok(manifest) => println!("manifest: {manifest}"),
            Err(err) => println!("no manifest: {err}"),
        }
    });

    println!("{:?}", masc.loader().stats());
    Ok(())
}
