use crate::services::ai_types::ChatMessage;

pub const TRANSLATOR_PROMPT: &str = r#"你负责 ComfyUI 插件汉化。请将提供的节点信息从英文到中文，严格按以下要求输出：

【核心规则】
1. 绝对不要修改 Key（键名保持不变）
2. 必须翻译 Value：即使是英文缩写或下划线组合（如 "proj_pt"、"dit_model"、"tiny_long"），也要结合语境意译成自然中文，禁止保留原文
3. 即使 Key=Value 也要翻译 Value
4. 保留 Emoji，不要删除或替换
5. 只输出纯 JSON：无解释、无 Markdown、无代码块、无额外字段；仅返回按照输入结构逐项翻译后的 JSON

【强制术语表（必须一致）】
- Seed -> 随机种子
- Steps -> 步数
- CFG -> 引导系数
- Sampler -> 采样器
- Scheduler -> 调度器
- Denoise -> 降噪
- Latent -> 潜空间
- VAE -> VAE
- CLIP -> CLIP
- Batch -> 批次
- Width/Height -> 宽/高
- Mask -> 遮罩
- Image -> 图像
- String -> 文本
- Float -> 浮点
- Int -> 整数
- Boolean -> 开关
- lora -> LoRA
- unet -> UNet
- attention -> 注意力
- scale -> 缩放
- crop -> 裁剪

【节点标题翻译】
- 保留功能类型标识，如 "While循环-起始"、"While循环-结束"
- 版本标识保持原样，如 "V2"、"SDXL"、"Ultra"
- 采用「动词+名词」结构，如 "IPAdapterApply" -> "应用IPAdapter"

【参数翻译规范】
- 保持专业术语准确且与术语表一致
- 正负面统一：positive->正面，negative->负面
- 数字编号保持，如 "weights_1"->"权重_1"

【Tooltip】
- 若原插件已有 tooltip 文本，则直接按该文本翻译为中文（不保留原文）
- 简洁准确描述功能、范围与注意事项

【输出格式】
- 只返回 JSON，对象结构与输入一致；仅翻译右侧值为中文
"#;

pub const TEST_PROMPT: &str = "你是一个专业的翻译助手。请用简短的一句话回应。";

const USER_PREFIX: &str = "请翻译以下节点信息:\n";

/// Models that reject a separate system role.
pub fn needs_single_user(model: &str) -> bool {
    let m = model.to_lowercase();
    m.contains("google/") || m.contains("gemma") || m.contains("gemini")
}

pub fn build_messages(payload: &str, single_user: bool) -> Vec<ChatMessage> {
    if single_user {
        vec![ChatMessage::user(format!(
            "{TRANSLATOR_PROMPT}\n\n{USER_PREFIX}{payload}"
        ))]
    } else {
        vec![
            ChatMessage::system(TRANSLATOR_PROMPT),
            ChatMessage::user(format!("{USER_PREFIX}{payload}")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_user_mode_inlines_system_prompt() {
        let msgs = build_messages("{}", true);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].content.starts_with(TRANSLATOR_PROMPT));
        assert!(msgs[0].content.ends_with("请翻译以下节点信息:\n{}"));

        let msgs = build_messages("{}", false);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[1].role, "user");
    }

    #[test]
    fn gemma_and_gemini_need_single_user() {
        assert!(needs_single_user("google/gemma-2-9b-it"));
        assert!(needs_single_user("Gemini-1.5-flash"));
        assert!(!needs_single_user("deepseek-chat"));
    }
}
