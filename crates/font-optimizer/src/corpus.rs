//! Text corpus determining which glyphs survive subsetting.

use std::collections::BTreeSet;

/// Text displayed by the invitation page.
pub const INVITATION_TEXT: &str = "\
🎉我们结婚啦！🎉
✨诚心邀请您来见证我们的幸福时刻✨
👫新人介绍👫
📅婚礼信息📅
🎪婚礼行程安排🎪
🎊诚心邀请🎊
🎊期待您的到来🎊
💌留下您的祝福💌
💌收到的祝福💌
江威张海雁
经过多年的相知相守，我们决定携手走进婚姻的殿堂，共同开启人生的新篇章！
时间地点
荆门市掇刀区高新·凤凰湖酒店一楼凤凰苑
2025年8月31日（星期天）
迎宾签到户外仪式午宴用餐
亲爱的朋友，我们诚心邀请您来参加我们的婚礼！您的到来将为我们的特别日子增添无限的喜悦和温暖。让我们一起见证这个美好的时刻，分享我们的幸福！
您的姓名出席人数祝福语
请输入您的姓名请输入您的祝福语
提交祝福查看祝福隐藏祝福
还没有收到祝福
正在为您准备精美的电子请柬
资源加载中已加载资源
正在准备正在加载婚礼字体正在加载木瑶字体正在加载婚礼照片
加载完成加载超时，正在跳过
请稍候，我们正在为您准备最完美的体验
正在加载
0123456789
年月日星期天
人
江威张海雁
";

/// Title of the guest management page.
pub const MANAGEMENT_TEXT: &str = "婚礼后台管理\n";

/// Common punctuation, both fullwidth and Latin.
pub const PUNCTUATION: &str = "，。！？；：''（）【】《》…—";

/// Latin letters and digits.
pub const LATIN_AND_DIGITS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Text whose chars must remain renderable after subsetting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    text: String,
}

impl Corpus {
    /// Creates a corpus from arbitrary text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Corpus for the invitation page: the page text, punctuation, Latin letters and digits.
    pub fn invitation() -> Self {
        Self::new([INVITATION_TEXT, PUNCTUATION, LATIN_AND_DIGITS].concat())
    }

    /// Corpus for the invitation page together with the management page.
    pub fn invitation_with_management() -> Self {
        Self::new([INVITATION_TEXT, MANAGEMENT_TEXT, PUNCTUATION, LATIN_AND_DIGITS].concat())
    }

    /// Returns the corpus text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns distinct chars of the corpus.
    pub fn chars(&self) -> BTreeSet<char> {
        self.text.chars().collect()
    }
}
