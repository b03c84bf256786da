// ==========================================
// 仓储定价运营系统 - 领域类型定义
// ==========================================
// 职责: 类别指导价、暂存阶段等枚举类型
// 序列化格式: 与定价后端保持一致
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 类别指导价 (Category Guide)
// ==========================================
// 锚定关系只能选择以下三类之一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CategoryGuide {
    #[serde(rename = "Drive Up")]
    DriveUp,
    #[serde(rename = "Climate Controlled")]
    ClimateControlled,
    #[serde(rename = "Parking")]
    Parking,
}

impl CategoryGuide {
    /// 全部可选类别（按界面展示顺序）
    pub const ALL: [CategoryGuide; 3] = [
        CategoryGuide::DriveUp,
        CategoryGuide::ClimateControlled,
        CategoryGuide::Parking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryGuide::DriveUp => "Drive Up",
            CategoryGuide::ClimateControlled => "Climate Controlled",
            CategoryGuide::Parking => "Parking",
        }
    }

    /// 宽松解析后端返回的类别标签
    ///
    /// 忽略大小写、空格、下划线与连字符，例如 "drive_up" / "DRIVE-UP" / "Drive Up" 均可识别
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(|c| c.to_lowercase())
            .collect();
        match key.as_str() {
            "driveup" => Some(CategoryGuide::DriveUp),
            "climatecontrolled" | "climate" | "cc" => Some(CategoryGuide::ClimateControlled),
            "parking" => Some(CategoryGuide::Parking),
            _ => None,
        }
    }
}

impl fmt::Display for CategoryGuide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 暂存阶段 (Stage Phase)
// ==========================================
// NEW: 本地已编辑、未确认
// SAVED: 操作员已确认、待发布
// 红线: NEW → SAVED 只能通过显式保存
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StagePhase {
    New,
    Saved,
}

impl fmt::Display for StagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagePhase::New => write!(f, "NEW"),
            StagePhase::Saved => write!(f, "SAVED"),
        }
    }
}
