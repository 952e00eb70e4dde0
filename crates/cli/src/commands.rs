/// 命令行子命令

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::info;

use conduit::{Client, Options, Reply};

use crate::fs::RemoteFs;

pub const USAGE: &str = "\
用法:
  conduit call <route> [key=value ...]
  conduit upload <route> <file> [key=value ...]
  conduit cat <path>";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 发起一次调用并打印结果
    Call { route: String, options: Options },
    /// 以文件内容作为负载分块上传后调用
    Upload {
        route: String,
        file: PathBuf,
        options: Options,
    },
    /// 读取远程文件并输出
    Cat { path: String },
}

impl Command {
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let name = args.next().context(USAGE)?;
        let rest: Vec<String> = args.collect();

        match (name.as_str(), rest.as_slice()) {
            ("call", [route, options @ ..]) => Ok(Self::Call {
                route: route.clone(),
                options: parse_options(options)?,
            }),
            ("upload", [route, file, options @ ..]) => Ok(Self::Upload {
                route: route.clone(),
                file: PathBuf::from(file),
                options: parse_options(options)?,
            }),
            ("cat", [path]) => Ok(Self::Cat { path: path.clone() }),
            _ => bail!("无法识别的参数: {} {}\n{}", name, rest.join(" "), USAGE),
        }
    }
}

/// 解析 `key=value` 形式的调用选项，值中可以再出现 `=`
fn parse_options(args: &[String]) -> anyhow::Result<Options> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((key, _)) if key.is_empty() => bail!("选项键不能为空: {}", arg),
            Some((key, value)) => Ok((key.to_string(), value.to_string())),
            None => bail!("选项必须是 key=value 形式: {}", arg),
        })
        .collect()
}

/// 执行命令，结果写入 `out`
pub async fn run(client: &Client, command: Command, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Call { route, options } => {
            let reply = client.call(&route, options, None).await?;
            writeln!(out, "{}", render(&reply))?;
        }
        Command::Upload {
            route,
            file,
            options,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("读取文件失败: {}", file.display()))?;
            info!("📤 上传 {} ({} 字节)", file.display(), data.len());
            let reply = client.call(&route, options, Some(data.as_slice())).await?;
            writeln!(out, "{}", render(&reply))?;
        }
        Command::Cat { path } => {
            let data = RemoteFs::new(client).read_file(&path).await?;
            out.write_all(&data)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// JSON 美化输出；字节按 UTF-8 输出，不是合法文本时只报告长度
pub fn render(reply: &Reply) -> String {
    match reply {
        Reply::Json(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        Reply::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => format!("<{} 字节二进制数据>", bytes.len()),
        },
    }
}
