/// ComfyUI type names that stay upper-case English.
pub const PRESERVED_TYPES: &[&str] = &[
    "IMAGE", "MASK", "MODEL", "CROP_DATA", "ZIP", "PDF", "CSV", "INT", "FLOAT", "BOOLEAN",
    "STRING", "BBOX_LIST",
];

pub const COMMON_TRANSLATIONS: &[(&str, &str)] = &[
    ("image", "图像"),
    ("mask", "遮罩"),
    ("model", "模型"),
    ("processor", "处理器"),
    ("device", "设备"),
    ("bbox", "边界框"),
    ("samples", "样本"),
    ("operation", "操作"),
    ("guide", "引导图"),
    ("source", "源"),
    ("destination", "目标"),
    ("threshold", "阈值"),
    ("radius", "半径"),
    ("epsilon", "epsilon"),
    ("contrast", "对比度"),
    ("brightness", "亮度"),
    ("saturation", "饱和度"),
    ("hue", "色调"),
    ("gamma", "伽马值"),
    ("index", "索引"),
    ("position", "位置"),
    ("size", "大小"),
    ("scale", "缩放"),
    ("dilation", "膨胀"),
    ("count", "计数"),
    ("result", "结果"),
];

pub const BODY_PARTS: &[(&str, &str)] = &[
    ("background", "背景"),
    ("skin", "皮肤"),
    ("nose", "鼻子"),
    ("eye", "眼睛"),
    ("eye_g", "眼镜"),
    ("brow", "眉毛"),
    ("ear", "耳朵"),
    ("mouth", "嘴巴"),
    ("lip", "嘴唇"),
    ("hair", "头发"),
    ("hat", "帽子"),
    ("neck", "脖子"),
    ("cloth", "衣服"),
];

pub const DIRECTION_PREFIXES: &[(&str, &str)] = &[("l_", "左"), ("r_", "右"), ("u_", "上"), ("b_", "下")];

pub const DIRECTION_SUFFIXES: &[(&str, &str)] = &[("_l", "左"), ("_r", "右"), ("_t", "上"), ("_b", "下")];

/// Raw type names a translator sometimes leaves as label values.
pub const TYPE_NAMES: &[(&str, &str)] = &[
    ("IMAGE", "图像"),
    ("MASK", "遮罩"),
    ("MODEL", "模型"),
    ("LATENT", "潜在空间"),
    ("VAE", "VAE"),
    ("CLIP", "CLIP"),
    ("CONDITIONING", "条件"),
    ("CONTROL_NET", "控制网络"),
    ("COMBO", "选项"),
    ("INT", "整数"),
    ("FLOAT", "浮点数"),
    ("STRING", "字符串"),
    ("BOOLEAN", "布尔值"),
];

pub fn lookup<'a>(table: &'a [(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}
