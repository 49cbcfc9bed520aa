use clap::Parser;

/// 工作簿聊天流式中继服务
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<String>,
}
