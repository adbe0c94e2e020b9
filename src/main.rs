use anyhow::{bail, Context};
use futures_util::StreamExt;
use std::path::PathBuf;
use vripper_client::model::ThreadParseStatus;
use vripper_client::{init_tracing, ClientConfig, Interest, PickerPhase, ServerEvent, ThreadLink, VripperClient};

const USAGE: &str = "usage: vripper-client [--config <file>] <command>

commands:
  watch                 print post updates until interrupted
  pick <thread-url>     parse a thread and queue the auto-pick, the linked post or every post
  queue <url>...        hand thread links to the server";

enum Command {
  Watch,
  Pick(String),
  Queue(Vec<String>),
}

fn parse_args() -> anyhow::Result<(Option<PathBuf>, Command)> {
  let mut args = std::env::args().skip(1);
  let mut config: Option<PathBuf> = None;
  let mut rest = Vec::new();
  while let Some(arg) = args.next() {
    if arg.as_str() == "--config" {
      config = Some(PathBuf::from(args.next().context("--config needs a path")?));
    } else {
      rest.push(arg);
    }
  }

  let mut rest = rest.into_iter();
  let cmd = match rest.next().as_deref() {
    Some("watch") => Command::Watch,
    Some("pick") => Command::Pick(rest.next().context("pick needs a thread url")?),
    Some("queue") => {
      let urls: Vec<String> = rest.collect();
      if urls.is_empty() {
        bail!("queue needs at least one url");
      }
      Command::Queue(urls)
    }
    _ => bail!("{USAGE}"),
  };
  Ok((config, cmd))
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ClientConfig> {
  match path {
    Some(p) => ClientConfig::from_file(&p),
    None => ClientConfig::from_env(),
  }
}

async fn watch(client: &VripperClient) -> anyhow::Result<()> {
  let channel = client.connection().get_connection().await?;
  let mut events = channel.subscribe_stream(Interest::Posts)?;
  tracing::info!(url = %client.config().server_url, "watching posts, ctrl-c to stop");

  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => break,
      next = events.next() => {
        let Some(event) = next else {
          tracing::warn!("channel closed by server");
          break;
        };
        match event {
          ServerEvent::Posts(posts) => {
            for p in posts {
              println!("{:<12} {:<12?} {:>6.1}% {}/{} {}", p.post_id, p.status, p.progress, p.done, p.total, p.title);
            }
          }
          ServerEvent::PostsRemoved(ids) => {
            for id in ids {
              println!("{id:<12} removed");
            }
          }
          ServerEvent::ThreadParsing(_) => {}
        }
      }
    }
  }
  Ok(())
}

async fn pick(client: &VripperClient, raw: &str) -> anyhow::Result<()> {
  let link = ThreadLink::parse(raw)?;
  // Subscribe before the server starts parsing so no batch is missed.
  let watch = client
    .watch_thread(&link.thread_id, |entry| {
      tracing::info!(post_id = %entry.post_id, title = %entry.title, "single post auto-picked");
    })
    .await?;
  client.queue_links(&link.url).await?;

  let phase = tokio::select! {
    phase = watch.ended() => phase,
    _ = tokio::signal::ctrl_c() => {
      watch.close();
      bail!("interrupted");
    }
  };
  match phase {
    PickerPhase::Ended(Some(ThreadParseStatus::End)) => {}
    other => bail!("thread {} did not finish parsing: {other:?}", link.thread_id),
  }

  {
    let mut picker = watch.picker();
    let wanted = watch
      .auto_picked()
      .map(|e| e.post_id)
      .or_else(|| link.post_id.clone());
    match wanted {
      Some(post_id) => {
        let url = picker.rows().iter().find(|r| r.post_id == post_id).map(|r| r.url.clone());
        match url {
          Some(url) => {
            picker.select(&url);
          }
          None => bail!("post {post_id} not found in thread {}", link.thread_id),
        }
      }
      None => picker.select_all(),
    }
  }

  let queued = client.submit_picks(&watch).await?;
  println!("queued {queued} post(s) from thread {}", link.thread_id);
  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let (config_path, cmd) = parse_args()?;
  let config = load_config(config_path)?;
  init_tracing(config.log_dir.as_deref())?;

  let client = VripperClient::new(config).context("failed to build client")?;
  let result = match cmd {
    Command::Watch => watch(&client).await,
    Command::Pick(url) => pick(&client, &url).await,
    Command::Queue(urls) => {
      let links = client.queue_links(&urls.join("\n")).await?;
      println!("queued {} thread link(s)", links.len());
      Ok(())
    }
  };
  client.shutdown().await;
  result
}
