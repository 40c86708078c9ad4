//! Prompt templates for the narration, allocation and review calls

use crate::model::{AnalysisRecord, CryptoPrices, PortfolioPlan, RiskProfile};

pub const TECHNICAL_ANALYSIS_SYSTEM: &str =
    "You are a Technical Analysis Agent focused on short-term cryptocurrency price action.";

pub const PORTFOLIO_SYSTEM: &str = r"You are a cryptocurrency portfolio strategist.

You receive short-term technical analysis for a set of coins, their current prices
and the user's risk profile. Propose an allocation that fits that risk profile.

Guidelines:
- Respect the risk profile: conservative portfolios favour large caps and stablecoins,
  aggressive portfolios may take larger positions in volatile assets
- Tie entry and exit points to the support and resistance levels you were given
- Call out coins whose RSI suggests overbought (>70) or oversold (<30) conditions
- Be explicit about uncertainty; this is analysis, not financial advice";

pub const REVIEW_SYSTEM: &str = r"You are a critical reviewer of cryptocurrency portfolio proposals.
Point out concentration risk, inconsistencies with the stated risk profile and
entry/exit levels that contradict the technical data. Keep it concise.";

/// User prompt for one coin's narration. `market_data` is the pretty JSON
/// document with `price`, `market_chart` and `ohlcv` sections.
pub fn technical_analysis_prompt(coin: &str, market_data: &str) -> String {
    format!(
        r"Analyze the short-term price action of {coin} using the data below.

Market data (last 7 data points, oldest first):
{market_data}

Provide:
1. Trend assessment (bullish, bearish or sideways) and its strength
2. Momentum read based on the moving averages and price trend
3. Key support and resistance levels to watch
4. Short-term outlook for the next few days

Keep the answer under 200 words."
    )
}

/// Human prompt for the allocation call
pub fn portfolio_prompt(
    analyses: &[AnalysisRecord],
    prices: &CryptoPrices,
    risk_profile: &RiskProfile,
) -> serde_json::Result<String> {
    let mut summary = String::from("Technical Analysis Summary:\n");
    for a in analyses {
        summary.push_str(&format!(
            "\n{coin}:\n\
             - Current Price: ${price:.2}\n\
             - RSI: {rsi:.1}\n\
             - 7-day MA: ${ma7:.2}\n\
             - Support: ${support:.2}\n\
             - Resistance: ${resistance:.2}\n\
             - Analysis: {analysis}\n",
            coin = a.coin,
            price = a.current_price,
            rsi = a.indicators.rsi,
            ma7 = a.indicators.ma7,
            support = a.levels.support,
            resistance = a.levels.resistance,
            analysis = a.llm_analysis,
        ));
    }

    let prices_json = serde_json::to_string_pretty(prices)?;

    Ok(format!(
        r"Technical Analysis and Market Data:
{summary}
Current cryptocurrency prices:
{prices_json}

User's risk profile: {risk_profile}

Based on the technical analysis and current market conditions, please provide:
1. A detailed portfolio allocation recommendation
2. Risk assessment for each suggested allocation
3. Entry and exit points based on technical levels
4. Portfolio diversification strategy
5. Suggested holding period"
    ))
}

pub fn review_prompt(plan: &PortfolioPlan) -> String {
    let coins: Vec<&str> = plan.technical_analysis.iter().map(|a| a.coin.as_str()).collect();
    format!(
        "Please review this portfolio (risk profile: {risk}, coins analyzed: {coins}):\n\n{analysis}\n\nand suggest improvements.",
        risk = plan.risk_profile,
        coins = coins.join(", "),
        analysis = plan.analysis,
    )
}
