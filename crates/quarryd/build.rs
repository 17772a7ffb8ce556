//! Build script: render the quarryd man page for packagers.

use std::{env, fs, io, path::Path, path::PathBuf};
use time::{OffsetDateTime, format_description::well_known::Iso8601};

const FALLBACK_DATE: &str = "1970-01-01";

fn manual_date() -> String {
    let Ok(raw) = env::var("SOURCE_DATE_EPOCH") else {
        return FALLBACK_DATE.into();
    };
    let Ok(seconds) = raw.parse::<i64>() else {
        println!(
            "cargo:warning=Invalid SOURCE_DATE_EPOCH '{raw}'; expected integer seconds; \
             falling back to {FALLBACK_DATE}"
        );
        return FALLBACK_DATE.into();
    };
    OffsetDateTime::from_unix_timestamp(seconds)
        .ok()
        .and_then(|moment| moment.format(&Iso8601::DATE).ok())
        .unwrap_or_else(|| {
            println!(
                "cargo:warning=SOURCE_DATE_EPOCH '{raw}' is out of range; falling back to \
                 {FALLBACK_DATE}"
            );
            FALLBACK_DATE.into()
        })
}

/// `{workspace}/target` derived from `OUT_DIR` (`target/{profile}/build/{crate}-{hash}/out`).
fn workspace_target_dir() -> Option<PathBuf> {
    let out_dir = PathBuf::from(env::var_os("OUT_DIR")?);
    out_dir
        .parent()?
        .parent()?
        .parent()?
        .parent()
        .map(PathBuf::from)
}

fn man_dir() -> PathBuf {
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown-target".into());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown-profile".into());
    workspace_target_dir()
        .unwrap_or_else(|| PathBuf::from("target"))
        .join(format!("generated-man/{target}/{profile}"))
}

fn write_man_page(data: &[u8], dir: &Path, page_name: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let destination = dir.join(page_name);
    let tmp = dir.join(format!("{page_name}.tmp"));
    fs::write(&tmp, data)?;
    fs::rename(&tmp, &destination)?;
    Ok(destination)
}

fn render(binary: &str, version: &str, date: &str) -> String {
    let title = binary.to_uppercase();
    format!(
        ".TH \"{title}\" \"1\" \"{date}\" \"{binary} {version}\" \"Quarry Node\"\n\
.SH NAME\n\
{binary} \\- distributed search and index node\n\
.SH SYNOPSIS\n\
.B {binary}\n\
\\-\\-server \\fIURL\\fR [\\fIOPTIONS\\fR]\n\
.SH DESCRIPTION\n\
{binary} validates its data directory, loads or creates a persistent node\n\
identity, opens the cluster config store, registers with the cluster and\n\
serves the REST API and web UI on \\-\\-bind\\-http.\n\
.SH OPTIONS\n\
.TP\n\\-\\-bind\\-http \\fIHOST:PORT\\fR\nListen address (default 0.0.0.0:8094).\n\
.TP\n\\-\\-data\\-dir \\fIDIR\\fR\nData directory; only the default \\fIdata\\fR is created.\n\
.TP\n\\-\\-cfg\\-connect \\fISPEC\\fR\nConfig store: simple, simple:PATH or mem.\n\
.TP\n\\-\\-server \\fIURL\\fR\nCluster server URL, or . for a local-only node.\n\
.TP\n\\-\\-register \\fIMODE\\fR\nwanted, wantedForce, known, knownForce, unwanted or unknown.\n\
.TP\n\\-\\-tags, \\-\\-container, \\-\\-weight\nPlacement metadata published with the node.\n\
.TP\n\\-\\-static\\-dir, \\-\\-static\\-etag\nStatic asset override directory and ETag.\n\
.TP\n\\-\\-log\\-filter, \\-\\-log\\-format\nTracing filter and json or compact output.\n\
.SH SIGNALS\n\
SIGUSR2 writes thread and memory snapshots to stderr.\n\
.SH EXIT STATUS\n\
0 on help, version or a clean unknown-mode exit; 2 on usage errors; 1 on\n\
fatal startup errors.\n"
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-env-changed=TARGET");
    println!("cargo:rerun-if-env-changed=PROFILE");

    let binary = env::var("CARGO_BIN_NAME")
        .or_else(|_| env::var("CARGO_PKG_NAME"))
        .unwrap_or_else(|_| "quarryd".into());
    let version = env::var("CARGO_PKG_VERSION")
        .map_err(|_| "CARGO_PKG_VERSION must be set by Cargo to render the man page")?;
    let page = render(&binary, &version, &manual_date());
    let page_name = format!("{binary}.1");

    write_man_page(page.as_bytes(), &man_dir(), &page_name)?;
    if let Some(out_dir) = env::var_os("OUT_DIR") {
        let out_dir = PathBuf::from(out_dir);
        if let Err(error) = write_man_page(page.as_bytes(), &out_dir, &page_name) {
            println!(
                "cargo:warning=Failed to stage manual page in OUT_DIR ({}): {error}",
                out_dir.display()
            );
        }
    }
    Ok(())
}
