use std::{io::Write, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;

use chatrelay_core_sdk::{config::env_defaults, prelude::*, server, telemetry};

/**
 * \brief CLI 程序入口：启动网关服务，或直接在终端里调用 Provider。
 */
#[derive(Parser, Debug)]
#[command(name = "chatrelay", version, about = "Multi-provider chat gateway")]
struct Cli {
    /** \brief 输出 JSON 结构化日志 */
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /** \brief 未设置 RUST_LOG 时的日志过滤指令 */
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 启动 HTTP 网关，未指定的参数取自 BACKEND_HOST / BACKEND_PORT。
     */
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /**
     * \brief 发送一条用户消息并打印回复。
     * \param provider Provider 标识（openai / anthropic / demo / 其他兼容服务）
     * \param model    模型名，留空时使用配置默认值
     * \param stream   是否逐段打印
     */
    Chat {
        #[arg(long, default_value = "demo")]
        provider: String,
        #[arg(long, default_value = "")]
        model: String,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long, default_value_t = false)]
        stream: bool,
    },

    /**
     * \brief 列出 Provider 的聊天模型。
     */
    Models {
        #[arg(long)]
        provider: String,
    },

    /**
     * \brief 用给定配置测试连接，不保存。
     */
    Test {
        #[arg(long)]
        provider: String,
        #[arg(long, default_value = "")]
        api_key: String,
        #[arg(long, default_value = "")]
        base_url: String,
        #[arg(long, default_value = "")]
        model: String,
    },
}

/**
 * \brief 命令行给出 key 或 base_url 时，以环境默认值为底构造内联配置。
 */
fn inline_config(
    provider: &str,
    model: &str,
    api_key: Option<String>,
    base_url: Option<String>,
) -> Option<ProviderConfig> {
    if api_key.is_none() && base_url.is_none() {
        return None;
    }
    let mut cfg = env_defaults(provider);
    if let Some(key) = api_key {
        cfg.api_key = key;
    }
    if let Some(url) = base_url {
        cfg.base_url = url;
    }
    if !model.is_empty() {
        cfg.model = model.to_string();
    }
    Some(cfg)
}

async fn run_chat(gateway: &Gateway, request: ChatRequest) -> Result<()> {
    if !request.stream {
        let resp = gateway.chat(request).await.context("chat failed")?;
        println!("{}", resp.message.content);
        if let Some(usage) = resp.usage {
            eprintln!(
                "tokens: prompt={} completion={} total={}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }
        return Ok(());
    }

    let mut events = gateway.chat_stream(request).context("open stream failed")?;
    let mut failure = None;
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Content { delta, .. } => {
                print!("{}", delta);
                std::io::stdout().flush().ok();
            }
            StreamEvent::Error { message } => failure = Some(message),
            StreamEvent::Done => break,
        }
    }
    println!();
    if let Some(message) = failure {
        bail!("stream error: {}", message);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.json_logs, cli.log_filter.as_deref())?;

    let gateway = Gateway::new(&HttpSettings::from_env()).context("build http client failed")?;

    match cli.command {
        Commands::Serve { host, port } => {
            let mut settings = ServerSettings::from_env();
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            server::run(&settings, Arc::new(gateway)).await?;
        }
        Commands::Chat {
            provider,
            model,
            prompt,
            system,
            api_key,
            base_url,
            stream,
        } => {
            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(Message::system(system));
            }
            messages.push(Message::user(prompt));

            let mut request = ChatRequest::new(provider.clone(), model.clone(), messages);
            request.stream = stream;
            request.inline_config = inline_config(&provider, &model, api_key, base_url);
            run_chat(&gateway, request).await?;
        }
        Commands::Models { provider } => {
            let models = gateway
                .list_models(&provider, None)
                .await
                .with_context(|| format!("list models for {} failed", provider))?;
            for model in models {
                println!("{}\t{}", model.id, model.owned_by);
            }
        }
        Commands::Test {
            provider,
            api_key,
            base_url,
            model,
        } => {
            let mut config = env_defaults(&provider);
            config.api_key = api_key;
            if !base_url.is_empty() {
                config.base_url = base_url;
            }
            if !model.is_empty() {
                config.model = model;
            }
            let report = gateway
                .test_connection(config)
                .await
                .context("connection test failed")?;
            println!("{}: {}", report.status, report.message);
            println!("{}", report.response);
        }
    }

    Ok(())
}
