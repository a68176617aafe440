//! End-to-end check against a real browser
//!
//! Loads a built, unpacked extension into Chrome through chromedriver,
//! opens a fixture page carrying a known ad container, and asserts the
//! runtime suppressed it.

use std::path::PathBuf;
use std::time::Duration;

use thirtyfour::prelude::*;
use thirtyfour::ChromeCapabilities;

pub struct E2eOptions {
    pub chromedriver_url: String,
    pub extension_path: String,
    pub headless: bool,
}

const FIXTURE_PAGE: &str = "data:text/html,<html><body>\
<div class=\"ad\" id=\"fixture-ad\">Sponsored</div>\
<main>content</main>\
</body></html>";

pub fn run_e2e(opts: E2eOptions) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {e}"))?;
    runtime.block_on(run_e2e_async(opts))
}

async fn run_e2e_async(opts: E2eOptions) -> Result<(), String> {
    let extension_path = canonicalize_path(&opts.extension_path)?;

    let mut caps = ChromeCapabilities::new();
    let disable_arg = format!("--disable-extensions-except={}", extension_path.display());
    caps.add_arg(&disable_arg)
        .map_err(|e| format!("Failed to set chrome arg: {e}"))?;
    let load_arg = format!("--load-extension={}", extension_path.display());
    caps.add_arg(&load_arg)
        .map_err(|e| format!("Failed to set chrome arg: {e}"))?;
    caps.add_arg("--no-first-run")
        .map_err(|e| format!("Failed to set chrome arg: {e}"))?;
    caps.add_arg("--no-default-browser-check")
        .map_err(|e| format!("Failed to set chrome arg: {e}"))?;
    if opts.headless {
        caps.add_arg("--headless=new")
            .map_err(|e| format!("Failed to set chrome arg: {e}"))?;
        caps.add_arg("--disable-gpu")
            .map_err(|e| format!("Failed to set chrome arg: {e}"))?;
    }

    let driver = WebDriver::new(&opts.chromedriver_url, caps)
        .await
        .map_err(|e| format!("Failed to connect to chromedriver: {e}"))?;

    let result = check_suppression(&driver).await;
    let _ = driver.quit().await;
    result
}

async fn check_suppression(driver: &WebDriver) -> Result<(), String> {
    driver
        .goto(FIXTURE_PAGE)
        .await
        .map_err(|e| format!("Failed to open fixture page: {e}"))?;

    // Give the content script time to initialize and run its first pass.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let display = driver
        .execute(
            "return getComputedStyle(document.getElementById('fixture-ad')).display;",
            Vec::new(),
        )
        .await
        .map_err(|e| format!("Failed to read computed style: {e}"))?;
    let display: String = display
        .convert()
        .map_err(|e| format!("Unexpected script result: {e}"))?;

    if display != "none" {
        return Err(format!(
            "Expected the fixture ad to be suppressed, computed display is '{display}'"
        ));
    }

    let marked = driver
        .execute(
            "return document.querySelectorAll('[data-ph-mark]').length;",
            Vec::new(),
        )
        .await
        .map_err(|e| format!("Failed to count markers: {e}"))?;
    let marked: u64 = marked
        .convert()
        .map_err(|e| format!("Unexpected script result: {e}"))?;
    if marked == 0 {
        return Err("No suppression markers found on the page".to_string());
    }

    println!("e2e: fixture ad suppressed ({marked} marked element(s))");
    Ok(())
}

fn canonicalize_path(path: &str) -> Result<PathBuf, String> {
    std::fs::canonicalize(path)
        .map_err(|e| format!("Failed to resolve extension path '{path}': {e}"))
}
