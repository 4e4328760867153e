//! User-facing strings. The bot speaks Arabic to its users; everything
//! here is the complete surface it ever sends.

use stemsplit_jobs::FailureKind;
use stemsplit_separation::StemChoice;

pub const WELCOME: &str =
    "👋 أهلاً! أرسل ملفاً صوتياً (MP3, WAV, OGG) وسأفصل لك صوت المغني عن الموسيقى.";
pub const HELP: &str = "أرسل ملفاً صوتياً ثم اختر: 🎤 صوت المغني أو 🎶 الموسيقى فقط.";

pub const AUDIO_ONLY: &str = "⚠️ يرجى إرسال ملف صوتي فقط (MP3, WAV, OGG).";
pub const DOWNLOADING: &str = "جارٍ تحميل الملف الصوتي...";
pub const DOWNLOAD_FAILED: &str = "❌ خطأ في التحميل.";
pub const CHOOSE_STEM: &str = "اختر ما تريد استخراجه:";
pub const BUTTON_VOCALS: &str = "🎤 صوت المغني";
pub const BUTTON_ACCOMPANIMENT: &str = "🎶 الموسيقى فقط";
pub const NO_FILE_FOUND: &str = "❌ لم يتم العثور على ملف.";
pub const PROCESSING: &str = "يتم المعالجة... قد يستغرق 30–90 ثانية.";
pub const BUSY: &str = "⏳ البوت مشغول حالياً، حاول بعد قليل.";

const FAILED_INVALID_AUDIO: &str =
    "❌ تعذّر قراءة الملف الصوتي. يرجى إرسال ملف MP3 أو WAV أو OGG سليم.";
const FAILED_MODEL_UNAVAILABLE: &str = "❌ خدمة الفصل غير متاحة حالياً. حاول لاحقاً.";
const FAILED_TIMEOUT: &str = "⏱️ استغرقت المعالجة وقتاً أطول من المسموح. جرّب ملفاً أقصر.";
const FAILED_INTERNAL: &str = "❌ حدث خطأ أثناء المعالجة. حاول مرة أخرى.";

const CAPTION_VOCALS: &str = "🎤 تم استخراج صوت المغني!";
const CAPTION_ACCOMPANIMENT: &str = "🎶 تم استخراج الموسيقى بدون صوت!";

/// Fixed per-kind failure text. Internal error detail never reaches the
/// user; it goes to the operator chat instead.
pub fn failure_text(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::InvalidAudio => FAILED_INVALID_AUDIO,
        FailureKind::ModelUnavailable => FAILED_MODEL_UNAVAILABLE,
        FailureKind::Timeout => FAILED_TIMEOUT,
        FailureKind::Internal => FAILED_INTERNAL,
    }
}

pub fn result_caption(choice: StemChoice) -> &'static str {
    match choice {
        StemChoice::Vocals => CAPTION_VOCALS,
        StemChoice::Accompaniment => CAPTION_ACCOMPANIMENT,
    }
}
